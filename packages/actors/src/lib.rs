//! Actor system for the background job pipeline.
//!
//! This crate provides the Ractor-based worker pool that drains the job
//! queue and performs artifact uploads and ticket emails.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor; spawns and restarts workers
//! - `WorkerActor` - Pops and runs the jobs of a single topic, in order
//! - `JobHandlers` - The side effects of each job kind
//!
//! # Usage
//!
//! ```ignore
//! use actors::{WorkerContext, WorkerPool};
//!
//! let pool = WorkerPool::start_all(context).await?;
//! // ... on shutdown signal
//! pool.shutdown();
//! pool.join().await?;
//! ```

mod error;
mod handler;
mod messages;
mod supervisor;
mod worker_actor;

pub use error::JobError;
pub use handler::{EmailTemplate, JobHandlers, pdf_key, qr_key};
pub use messages::{SupervisorMessage, WorkerMessage};
pub use supervisor::{Supervisor, WorkerPool};
pub use worker_actor::{WorkerActor, WorkerContext, WorkerSettings};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
