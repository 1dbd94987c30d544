// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cropwerk Pool — bounded worker pool for compositing tasks, cooperative
// cancellation, and the batch orchestrator that groups pages into questions,
// dispatches them, and folds the outcomes into a report.

pub mod abort;
pub mod batch;
pub mod failure;
pub mod pool;

pub use abort::AbortSignal;
pub use batch::{BatchEvent, BatchReport, QuestionFailure, QuestionRef, run_batch};
pub use failure::classify_error;
pub use pool::{PoolStats, TaskHandle, WorkerPool};
