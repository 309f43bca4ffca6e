//! Application context: the stores and clients a view layer is built on.

use std::sync::Arc;

use mylocal_shared::{ApiError, PageQuery, User};

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::realtime::RealtimeSession;
use crate::services::{auth, chats};
use crate::session::SessionStore;
use crate::storage::Storage;
use crate::stores::{ChatStore, Notifications, Route, RouteStore};

pub struct AppContext {
    pub config: ClientConfig,
    api: ApiClient,
    chat: ChatStore,
    realtime: Arc<RealtimeSession>,
}

impl AppContext {
    /// Build the context, restoring any persisted session.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let session = SessionStore::load(Storage::new(&config.storage_dir));
        let chat = ChatStore::new();
        let realtime = Arc::new(RealtimeSession::new(
            config.ws_url.clone(),
            session.clone(),
            chat.clone(),
        ));

        // A rejected token tears down the same state as an explicit logout.
        let weak = Arc::downgrade(&realtime);
        let signed_out_chat = chat.clone();
        let api = ApiClient::new(&config, session, Notifications::new(), RouteStore::new())?
            .on_signed_out(move || {
                if let Some(realtime) = weak.upgrade() {
                    realtime.disconnect();
                }
                signed_out_chat.reset();
            });
        Ok(Self {
            config,
            api,
            chat,
            realtime,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        self.api.session()
    }

    pub fn notifications(&self) -> &Notifications {
        self.api.notifications()
    }

    pub fn router(&self) -> &RouteStore {
        self.api.router()
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    pub fn realtime(&self) -> &RealtimeSession {
        &self.realtime
    }

    /// Resume a restored session: start the realtime connection.
    pub fn start(&self) {
        if self.session().is_authenticated() {
            if let Err(e) = self.realtime.connect() {
                tracing::debug!("Realtime not started: {}", e);
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let user = auth::login(&self.api, email, password).await?;
        // Never reuse a socket or cache from a previous identity.
        self.realtime.disconnect();
        self.chat.reset();
        self.start();
        self.router().navigate(Route::Home);
        Ok(user)
    }

    pub fn logout(&self) {
        self.realtime.disconnect();
        self.chat.reset();
        auth::logout(&self.api);
        self.router().navigate(Route::Login);
    }

    /// Load the chat list and unread badge into the chat store.
    pub async fn refresh_chats(&self) -> Result<(), ApiError> {
        let page = chats::list(&self.api, &PageQuery::default()).await?;
        self.chat.set_chats(page.items);
        let unread = chats::unread_count(&self.api).await?;
        self.chat.set_unread(unread);
        Ok(())
    }

    /// Load the latest page of a chat, join its room and mark it read.
    pub async fn open_chat(&self, chat_id: &str) -> Result<(), ApiError> {
        let page = chats::messages(&self.api, chat_id, &PageQuery::default()).await?;
        self.chat.set_history(chat_id, page.items);
        self.router().navigate(Route::ChatRoom {
            id: chat_id.to_string(),
        });
        // The view shows the disconnected indicator from the chat store.
        if self.realtime.join_chat(chat_id).is_ok() {
            let _ = self.realtime.mark_messages_read(chat_id, Vec::new());
        }
        Ok(())
    }
}
