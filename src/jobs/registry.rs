//! Static mapping from job type to the processor that performs its side
//! effect.
//!
//! Processors are black boxes from the queue's point of view: they receive
//! the job's payload, never touch store state, and report back a structured
//! result — a success map, or a `JobError` whose kind decides retryability.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::jobs::error::{ErrorKind, JobError};
use crate::jobs::model::JobType;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ProcessorFn = dyn Fn(ProcessorRequest) -> BoxFuture<Result<Value, JobError>> + Send + Sync;

/// Everything a processor gets to see about the job it is running.
#[derive(Debug, Clone)]
pub struct ProcessorRequest {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub payload: Value,
    /// 1-based attempt number across the whole job's lifetime.
    pub attempt: i32,
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<JobType, Arc<ProcessorFn>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, job_type: JobType, processor: F)
    where
        F: Fn(ProcessorRequest) -> BoxFuture<Result<Value, JobError>> + Send + Sync + 'static,
    {
        self.processors.insert(job_type, Arc::new(processor));
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<ProcessorFn>> {
        self.processors.get(&job_type).cloned()
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.processors.contains_key(&job_type)
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: &Value) -> Result<T, JobError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| JobError::new(ErrorKind::Validation, e.to_string()))
}

fn boxed<T>(fut: impl Future<Output = T> + Send + 'static) -> BoxFuture<T> {
    Box::pin(fut)
}

#[derive(Deserialize)]
struct EmailSendPayload {
    email: String,
    #[serde(default)]
    template: Option<String>,
}

#[derive(Deserialize)]
struct EnrollmentConfirmationPayload {
    user_id: i64,
    course_id: i64,
}

#[derive(Deserialize)]
struct PaymentVerifyPayload {
    order_id: String,
}

#[derive(Deserialize)]
struct ExternalSyncPayload {
    entity: String,
    #[serde(default)]
    entity_id: Option<String>,
}

/// The storefront's processor catalog. The actual delivery/billing/LMS
/// calls live behind these functions; here they validate the payload and
/// report the structured outcome the queue records.
pub fn build_registry() -> Arc<ProcessorRegistry> {
    let mut registry = ProcessorRegistry::new();

    registry.register(JobType::EmailSend, |req| {
        boxed(async move {
            let payload: EmailSendPayload = parse_payload(&req.payload)?;
            tracing::debug!(job_id = %req.job_id, recipient = %payload.email, "sending email");
            Ok(json!({
                "emailSent": true,
                "recipient": payload.email,
                "template": payload.template,
            }))
        })
    });

    registry.register(JobType::EnrollmentConfirmation, |req| {
        boxed(async move {
            let payload: EnrollmentConfirmationPayload = parse_payload(&req.payload)?;
            tracing::debug!(
                job_id = %req.job_id,
                user_id = payload.user_id,
                course_id = payload.course_id,
                "sending enrollment confirmation"
            );
            Ok(json!({
                "confirmationSent": true,
                "userId": payload.user_id,
                "courseId": payload.course_id,
            }))
        })
    });

    registry.register(JobType::PaymentVerify, |req| {
        boxed(async move {
            let payload: PaymentVerifyPayload = parse_payload(&req.payload)?;
            tracing::debug!(job_id = %req.job_id, order_id = %payload.order_id, "verifying payment");
            Ok(json!({
                "verified": true,
                "orderId": payload.order_id,
            }))
        })
    });

    registry.register(JobType::ExternalSync, |req| {
        boxed(async move {
            let payload: ExternalSyncPayload = parse_payload(&req.payload)?;
            tracing::debug!(job_id = %req.job_id, entity = %payload.entity, "syncing with LMS");
            Ok(json!({
                "synced": true,
                "entity": payload.entity,
                "entityId": payload.entity_id,
            }))
        })
    });

    Arc::new(registry)
}
