// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Wire formats for telephony WebSocket protocols.

pub mod twilio;
