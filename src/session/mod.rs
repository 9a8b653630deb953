// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Per-call bridging: inbound and outbound audio paths plus the session
//! controller that ties them to the Twilio transport and the AI session.

pub mod controller;
pub mod inbound;
pub mod outbound;

pub use controller::{CallSession, SessionController, SessionState};
pub use inbound::InboundPipeline;
pub use outbound::{OutboundPipeline, PlaybackItem, PlaybackQueue};
