// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod baseline_learner;
pub mod reconciler;

pub use baseline_learner::BaselineLearner;
pub use reconciler::{ReconcilerError, StateReconciler};
