// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairs of operation types that must not run concurrently on one resource.

use gavel_core::ops::*;

/// Symmetric: each pair is listed once and checked in both directions.
pub const CONFLICTING_TYPES: &[(&str, &str)] = &[
    (BAN_USER, UNBAN_USER),
    (KICK_USER, BAN_USER),
    (TIMEOUT_USER, UNTIMEOUT_USER),
    (DELETE_MESSAGE, EDIT_MESSAGE),
    (DELETE_CHANNEL, UPDATE_CHANNEL),
    (LOCK_CHANNEL, UNLOCK_CHANNEL),
];

/// Whether `a` and `b` conflict on the same resource.
pub fn conflicts(a: &str, b: &str) -> bool {
    CONFLICTING_TYPES
        .iter()
        .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a))
}

/// Every type that conflicts with `op_type`.
pub fn conflicting_types(op_type: &str) -> impl Iterator<Item = &'static str> + '_ {
    CONFLICTING_TYPES.iter().filter_map(move |(x, y)| {
        if *x == op_type {
            Some(*y)
        } else if *y == op_type {
            Some(*x)
        } else {
            None
        }
    })
}
