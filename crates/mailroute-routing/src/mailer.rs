//! Mail router facade
//!
//! Binds the dispatcher to the two well-known flows and drives each request
//! through its flow's retry policy. Callers that want a delivery log persist
//! the returned [`DeliveryAttemptResult`] themselves.

use crate::{
    dispatcher::{DeliveryAttemptResult, Dispatcher},
    retry::{RetryDriver, RetryPolicy},
};
use mailroute_core::{
    DeliveryRequest, Result,
    flow::{MAIL_SERVICE, RECEIVE_MAIL_SERVICE},
};
use std::sync::Arc;

/// Sends and receives mail through a shared dispatcher
pub struct MailRouter {
    dispatcher: Arc<Dispatcher>,
    send_retry: RetryDriver,
    receive_retry: RetryDriver,
}

impl MailRouter {
    /// Create a router with the default retry policies
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            send_retry: RetryDriver::new(RetryPolicy::send_default()),
            receive_retry: RetryDriver::new(RetryPolicy::receive_default()),
        }
    }

    pub fn with_send_retry(mut self, policy: RetryPolicy) -> Self {
        self.send_retry = RetryDriver::new(policy);
        self
    }

    pub fn with_receive_retry(mut self, policy: RetryPolicy) -> Self {
        self.receive_retry = RetryDriver::new(policy);
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Route an outbound message on `MAIL_SERVICE`
    pub async fn send_mail(&self, request: &DeliveryRequest) -> Result<DeliveryAttemptResult> {
        self.route(MAIL_SERVICE, request, &self.send_retry).await
    }

    /// Route an inbound message on `RECEIVE_MAIL_SERVICE`
    pub async fn receive_mail(&self, request: &DeliveryRequest) -> Result<DeliveryAttemptResult> {
        self.route(RECEIVE_MAIL_SERVICE, request, &self.receive_retry)
            .await
    }

    /// Route on an arbitrary flow with an explicit retry driver
    pub async fn route(
        &self,
        flow: &str,
        request: &DeliveryRequest,
        retry: &RetryDriver,
    ) -> Result<DeliveryAttemptResult> {
        retry
            .run(|attempt| self.dispatcher.dispatch(flow, request, attempt))
            .await
    }
}
