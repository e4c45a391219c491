// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod sources;

pub use event_bus::{EventBus, EventBusError, IssueReceiver, MonitorEvent};
pub use sources::{build_domain, FnSnapshotProvider, HttpSnapshotProvider, StaticSnapshotProvider};
