// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Utility helpers shared across the bridge.

pub mod helpers;
