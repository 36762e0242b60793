// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle function backends.

pub mod command;
pub mod mock;
mod traits;

pub use command::CommandFunction;
pub use mock::MockFunction;
pub use traits::*;
