// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire contract shared by the drover gateway and runner: request signing,
//! secret redaction, sentinel commands, the worker registry, and the event
//! and WebSocket frame types both halves speak.

pub mod events;
pub mod frames;
pub mod redact;
pub mod sentinel;
pub mod sign;
pub mod workers;
