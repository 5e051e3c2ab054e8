//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{in_progress, to_rpc_error};
use crate::types::{
    ActionSummary, InvokeRequest, InvokeResponse, ListActionsRequest, ListActionsResponse,
    ProbeStatusRequest, ProbeStatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use lifeguard_core::application::{CompletionHandle, Dispatched, Dispatcher, ProbeStatusBoard};
use lifeguard_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    dispatcher: Arc<Dispatcher>,
    probes: ProbeStatusBoard,
    /// At most one background run per action; polled by repeated calls
    pending: Mutex<HashMap<String, CompletionHandle>>,
}

impl RpcHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, probes: ProbeStatusBoard) -> Self {
        Self {
            dispatcher,
            probes,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// action.invoke.v1
    pub async fn invoke(&self, params: InvokeRequest) -> Result<InvokeResponse, ErrorObjectOwned> {
        if params.non_blocking {
            return self.invoke_non_blocking(params).await;
        }

        match self.dispatcher.invoke(params).await.map_err(to_rpc_error)? {
            Dispatched::Completed(result) => Ok(InvokeResponse::from_result(None, result)),
            Dispatched::Pending(handle) => Self::finish(handle).await,
        }
    }

    /// Non-blocking protocol: the first call starts the run and answers
    /// IN_PROGRESS, later calls answer IN_PROGRESS until the run is done,
    /// the first call after that takes the result and frees the slot.
    async fn invoke_non_blocking(
        &self,
        params: InvokeRequest,
    ) -> Result<InvokeResponse, ErrorObjectOwned> {
        let mut pending = self.pending.lock().await;

        if let Some(handle) = pending.get(&params.action) {
            if !handle.is_finished() {
                return Err(in_progress(&params.action, handle.invocation_id()));
            }
        }
        if let Some(handle) = pending.remove(&params.action) {
            drop(pending);
            debug!(
                action = %params.action,
                invocation_id = %handle.invocation_id(),
                "Returning finished non-blocking result"
            );
            return Self::finish(handle).await;
        }

        let action = params.action.clone();
        match self.dispatcher.invoke(params).await.map_err(to_rpc_error)? {
            Dispatched::Pending(handle) => {
                let err = in_progress(&action, handle.invocation_id());
                pending.insert(action, handle);
                Err(err)
            }
            Dispatched::Completed(result) => Ok(InvokeResponse::from_result(None, result)),
        }
    }

    async fn finish(handle: CompletionHandle) -> Result<InvokeResponse, ErrorObjectOwned> {
        let invocation_id = handle.invocation_id().to_string();
        let result = handle.wait().await.map_err(to_rpc_error)?;
        Ok(InvokeResponse::from_result(Some(invocation_id), result))
    }

    /// action.list.v1
    pub async fn list_actions(
        &self,
        _params: ListActionsRequest,
    ) -> Result<ListActionsResponse, ErrorObjectOwned> {
        let actions = self
            .dispatcher
            .actions()
            .iter()
            .map(|spec| ActionSummary::from(spec.as_ref()))
            .collect();
        Ok(ListActionsResponse { actions })
    }

    /// probe.status.v1
    pub async fn probe_status(
        &self,
        params: ProbeStatusRequest,
    ) -> Result<ProbeStatusResponse, ErrorObjectOwned> {
        self.probes
            .status(&params.probe)
            .map(ProbeStatusResponse::from)
            .ok_or_else(|| to_rpc_error(AppError::NotFound(format!("probe '{}'", params.probe))))
    }
}
