use mylocal_shared::{
    ApiError, Business, BusinessFilter, CreateBusinessRequest, PageQuery, Paginated,
    UpdateBusinessRequest,
};

use super::seg;
use crate::api_client::ApiClient;

pub async fn list(api: &ApiClient, filter: &BusinessFilter) -> Result<Paginated<Business>, ApiError> {
    api.get_query("/api/businesses", filter).await
}

pub async fn get(api: &ApiClient, id: &str) -> Result<Business, ApiError> {
    api.get_json(&format!("/api/businesses/{}", seg(id))).await
}

/// Businesses owned by the current vendor.
pub async fn mine(api: &ApiClient, page: &PageQuery) -> Result<Paginated<Business>, ApiError> {
    api.get_query("/api/businesses/mine", page).await
}

pub async fn create(api: &ApiClient, req: &CreateBusinessRequest) -> Result<Business, ApiError> {
    api.post_json("/api/businesses", req).await
}

pub async fn update(
    api: &ApiClient,
    id: &str,
    req: &UpdateBusinessRequest,
) -> Result<Business, ApiError> {
    api.put_json(&format!("/api/businesses/{}", seg(id)), req).await
}

pub async fn delete(api: &ApiClient, id: &str) -> Result<(), ApiError> {
    api.delete(&format!("/api/businesses/{}", seg(id))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::test_support::harness;
    use mylocal_shared::{BusinessCategory, BusinessSort, Pagination};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn list_sends_filters_as_query() {
        let server = MockServer::start().await;
        let empty: Paginated<Business> = Paginated {
            items: vec![],
            pagination: Pagination::new(&PageQuery::new(2, 5), 0),
        };
        Mock::given(method("GET"))
            .and(path("/api/businesses"))
            .and(query_param("category", "restaurant"))
            .and(query_param("city", "Portland"))
            .and(query_param("minRating", "4.5"))
            .and(query_param("sort", "rating"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), None);
        let filter = BusinessFilter {
            category: Some(BusinessCategory::Restaurant),
            city: Some("Portland".into()),
            min_rating: Some(4.5),
            sort: Some(BusinessSort::Rating),
            page: Some(2),
            limit: Some(5),
            ..Default::default()
        };
        let page = list(&h.api, &filter).await.unwrap();
        assert_eq!(page.pagination.page, 2);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/businesses/b1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        delete(&h.api, "b1").await.unwrap();
    }
}
