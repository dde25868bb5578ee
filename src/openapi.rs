use crate::models::{FriendRequest, Identity, Message, NewIdentity, NewThread, RequestStatus, Thread};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::list_threads,
        crate::routes::create_thread,
        crate::routes::list_thread_messages,
        crate::routes::post_thread_message,
        crate::routes::sample_topics,
        crate::routes::topic_prompt,
        crate::routes::get_conversation,
        crate::routes::post_chat_message,
        crate::routes::send_friend_request,
        crate::routes::list_incoming_requests,
        crate::routes::approve_friend_request,
        crate::routes::list_friends,
    ),
    components(schemas(
        Identity, NewIdentity, Message, Thread, NewThread,
        FriendRequest, RequestStatus,
        crate::routes::LoginRequest, crate::routes::TokenResponse,
        crate::routes::PostMessageInput, crate::routes::NewChatMessage,
        crate::routes::TopicOffer, crate::routes::PromptCard, crate::routes::ConversationView,
        crate::routes::FriendRequestInput
    )),
    tags(
        (name = "identity", description = "Registration and login"),
        (name = "board", description = "Public threads"),
        (name = "chat", description = "Direct messages and topics"),
        (name = "friends", description = "Friend requests and edges"),
    )
)]
pub struct ApiDoc;
