// Copyright 2026 The Rayrelay Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod error;
pub mod message;
pub mod models;
pub mod protocol;
pub mod proxy;
pub mod relay;
pub mod stream;
