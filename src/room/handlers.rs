use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::directory::{JoinRoomResult, LeaveRoomResult};
use super::fanout::FanoutReport;
use super::models::RoomModel;
use crate::auth::AuthenticatedUser;
use crate::events::{MemberState, ServerEvent};
use crate::profile::Profile;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MembershipResponse {
    pub room: RoomModel,
    pub changed: bool,
}

async fn caller_profile(state: &AppState, user_id: &str) -> Result<Profile, AppError> {
    state
        .profiles
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))
}

/// HTTP handler for posting a chat message to a room
///
/// POST /rooms/:room_id/messages
/// Fans the message out to every other member
#[instrument(skip(state, user, request), fields(user_id = %user.id()))]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(room_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<FanoutReport>, AppError> {
    if request.content.trim().is_empty() && request.attachments.is_empty() {
        return Err(AppError::BadRequest("Message is empty".to_string()));
    }

    let members = state
        .rooms
        .get_room_members(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;
    if !members.iter().any(|member| member == user.id()) {
        return Err(AppError::Forbidden("Not a member of this room".to_string()));
    }

    let author = caller_profile(&state, user.id()).await?;
    let online = match state.registry.get(user.id()) {
        Some(session) => session.is_alive().await,
        None => false,
    };

    let event = ServerEvent::message(
        &author,
        online,
        &room_id,
        request.content,
        request.attachments,
    );
    let report = state
        .fanout
        .fan_out(&room_id, &event, &[user.id().to_string()])
        .await;

    Ok(Json(report))
}

/// HTTP handler for joining a room, creating it if needed
///
/// POST /rooms/:room_id/join
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn join_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(room_id): Path<String>,
) -> Result<Json<MembershipResponse>, AppError> {
    let profile = caller_profile(&state, user.id()).await?;

    let room = match state.rooms.try_join_room(&room_id, user.id()).await? {
        JoinRoomResult::Joined(room) => room,
        JoinRoomResult::AlreadyMember => {
            let members = state.rooms.get_room_members(&room_id).await?.unwrap_or_default();
            return Ok(Json(MembershipResponse {
                room: RoomModel {
                    id: room_id,
                    members,
                },
                changed: false,
            }));
        }
    };

    let event = ServerEvent::update_member(&room_id, &profile.username, MemberState::Join);
    state
        .fanout
        .fan_out(&room_id, &event, &[user.id().to_string()])
        .await;

    info!(room_id = %room_id, members = room.members.len(), "Member joined");
    Ok(Json(MembershipResponse {
        room,
        changed: true,
    }))
}

/// HTTP handler for leaving a room
///
/// POST /rooms/:room_id/leave
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(room_id): Path<String>,
) -> Result<Json<MembershipResponse>, AppError> {
    let profile = caller_profile(&state, user.id()).await?;

    let room = match state.rooms.leave_room(&room_id, user.id()).await? {
        LeaveRoomResult::Left(room) => room,
        LeaveRoomResult::NotMember => {
            return Err(AppError::BadRequest("Not a member of this room".to_string()))
        }
        LeaveRoomResult::RoomNotFound => {
            return Err(AppError::NotFound(format!("Room {} not found", room_id)))
        }
    };

    // The leaver is no longer a member, so the remaining members get this
    let event = ServerEvent::update_member(&room_id, &profile.username, MemberState::Leave);
    state.fanout.fan_out(&room_id, &event, &[]).await;

    info!(room_id = %room_id, members = room.members.len(), "Member left");
    Ok(Json(MembershipResponse {
        room,
        changed: true,
    }))
}
