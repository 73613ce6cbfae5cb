// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod aggregate;
pub mod endpoint;
pub mod validate;
pub mod verify;
