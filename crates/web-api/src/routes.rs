use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::ChatListFilter;
use domain::{
    ChatId, ChatWithMembers, CursorPage, CursorQuery, MessageId, MessageWithAuthor, SortDirection,
    DEFAULT_PAGE_SIZE,
};

use crate::{error::ApiError, state::AppState, websocket::websocket_upgrade};

#[derive(Debug, Deserialize)]
struct ChatPayload {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    message: String,
}

/// 列表接口共用的分页参数。`after_id` 是上一页最后见到的 id，
/// `id_dir` 决定翻页方向，缺省从最新到最旧。
#[derive(Debug, Deserialize)]
struct PageParams {
    after_id: Option<i64>,
    per_page: Option<i64>,
    id_dir: Option<SortDirection>,
}

impl PageParams {
    fn into_query(self) -> Result<CursorQuery, ApiError> {
        Ok(CursorQuery::new(
            self.after_id,
            self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
            self.id_dir.unwrap_or_default(),
        )?)
    }
}

// 不能复用 PageParams 作 flatten 字段：serde_urlencoded 对
// flatten + 数字字段的组合解析不了
#[derive(Debug, Deserialize)]
struct ListChatsParams {
    after_id: Option<i64>,
    per_page: Option<i64>,
    id_dir: Option<SortDirection>,
    /// 跨主题、成员、消息正文的子串搜索。
    query: Option<String>,
    /// 只列出该用户参与的聊天。
    user_id: Option<i64>,
}

impl ListChatsParams {
    fn into_parts(self) -> Result<(ChatListFilter, CursorQuery), ApiError> {
        let filter = ChatListFilter {
            member_user_id: self.user_id.map(Into::into),
            search: self.query,
        };
        let query = CursorQuery::new(
            self.after_id,
            self.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
            self.id_dir.unwrap_or_default(),
        )?;
        Ok((filter, query))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chats", post(create_chat).get(list_chats))
        .route("/chats/{chat_id}", patch(update_chat).delete(delete_chat))
        .route("/chats/{chat_id}/join", post(join_chat))
        .route("/chats/{chat_id}/leave", post(leave_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(list_messages).post(add_message),
        )
        .route(
            "/messages/{message_id}",
            patch(update_message).delete(delete_message),
        )
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> Result<(StatusCode, Json<ChatWithMembers>), ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let chat = state
        .chat_service
        .create_chat(&identity, &payload.topic)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListChatsParams>,
) -> Result<Json<CursorPage<ChatWithMembers>>, ApiError> {
    state.jwt_service.identity_from_headers(&headers)?;
    let (filter, query) = params.into_parts()?;
    let page = state.chat_service.list_chats(&filter, &query).await?;
    Ok(Json(page))
}

async fn update_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatWithMembers>, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let chat = state
        .chat_service
        .update_chat(&identity, ChatId::new(chat_id), &payload.topic)
        .await?;
    Ok(Json(chat))
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    state
        .chat_service
        .delete_chat(&identity, ChatId::new(chat_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn join_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
) -> Result<Json<ChatWithMembers>, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let chat = state
        .chat_service
        .join_chat(&identity, ChatId::new(chat_id))
        .await?;
    Ok(Json(chat))
}

async fn leave_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    state
        .chat_service
        .leave_chat(&identity, ChatId::new(chat_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<CursorPage<MessageWithAuthor>>, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let query = params.into_query()?;
    let page = state
        .message_service
        .list_messages(&identity, ChatId::new(chat_id), &query)
        .await?;
    Ok(Json(page))
}

async fn add_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<i64>,
    Json(payload): Json<MessagePayload>,
) -> Result<(StatusCode, Json<MessageWithAuthor>), ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let message = state
        .message_service
        .add_message(&identity, ChatId::new(chat_id), &payload.message)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn update_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<i64>,
    Json(payload): Json<MessagePayload>,
) -> Result<Json<MessageWithAuthor>, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    let message = state
        .message_service
        .update_message(&identity, MessageId::new(message_id), &payload.message)
        .await?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let identity = state.jwt_service.identity_from_headers(&headers)?;
    state
        .message_service
        .delete_message(&identity, MessageId::new(message_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
