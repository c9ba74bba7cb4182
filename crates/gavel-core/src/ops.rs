// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operation type names understood by the built-in classifier tables.

pub const BAN_USER: &str = "BAN_USER";
pub const UNBAN_USER: &str = "UNBAN_USER";
pub const KICK_USER: &str = "KICK_USER";
pub const TIMEOUT_USER: &str = "TIMEOUT_USER";
pub const UNTIMEOUT_USER: &str = "UNTIMEOUT_USER";
pub const ADD_ROLE: &str = "ADD_ROLE";
pub const REMOVE_ROLE: &str = "REMOVE_ROLE";

pub const SEND_MESSAGE: &str = "SEND_MESSAGE";
pub const EDIT_MESSAGE: &str = "EDIT_MESSAGE";
pub const DELETE_MESSAGE: &str = "DELETE_MESSAGE";
pub const PIN_MESSAGE: &str = "PIN_MESSAGE";
pub const UNPIN_MESSAGE: &str = "UNPIN_MESSAGE";
pub const ADD_REACTION: &str = "ADD_REACTION";
pub const REMOVE_REACTION: &str = "REMOVE_REACTION";

pub const CREATE_CHANNEL: &str = "CREATE_CHANNEL";
pub const UPDATE_CHANNEL: &str = "UPDATE_CHANNEL";
pub const DELETE_CHANNEL: &str = "DELETE_CHANNEL";
pub const LOCK_CHANNEL: &str = "LOCK_CHANNEL";
pub const UNLOCK_CHANNEL: &str = "UNLOCK_CHANNEL";
pub const SET_SLOWMODE: &str = "SET_SLOWMODE";

pub const BULK_BAN: &str = "BULK_BAN";
pub const BULK_KICK: &str = "BULK_KICK";
pub const BULK_TIMEOUT: &str = "BULK_TIMEOUT";
pub const BULK_DELETE_MESSAGES: &str = "BULK_DELETE_MESSAGES";
pub const PRUNE_MEMBERS: &str = "PRUNE_MEMBERS";
pub const SYNC_ROLES: &str = "SYNC_ROLES";
pub const SEND_ANNOUNCEMENT: &str = "SEND_ANNOUNCEMENT";
