// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Implements the generated `RtdService` gRPC trait against a [`runtime::SharedState`]
//! handle, the same shared state the sampling/control loop reads and writes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tonic::{Request, Response, Status};

use runtime::{Policy, SharedState, Stats};

use crate::child_hosts::ChildHostRegistry;
use crate::proto;
use crate::proto::rtd_service_server::RtdService;

/// Wraps the loop-facing [`SharedState`] handshake and the child-host tree membership, and
/// serves both over gRPC.
pub struct RtdServiceImpl {
    shared: SharedState,
    child_hosts: Arc<ChildHostRegistry>,
}

impl RtdServiceImpl {
    pub fn new(shared: SharedState, child_hosts: Arc<ChildHostRegistry>) -> Self {
        RtdServiceImpl { shared, child_hosts }
    }
}

fn policy_to_proto(policy: &Policy) -> proto::Policy {
    proto::Policy {
        agent: policy.agent.as_str().to_string(),
        period_seconds: policy.period_seconds,
        profile: policy.profile.clone(),
        params: policy.params.clone(),
    }
}

fn proto_to_policy(policy: proto::Policy) -> Result<Policy, Status> {
    Policy::new(&policy.agent, policy.period_seconds, policy.profile, policy.params)
        .map_err(|e| Status::invalid_argument(e.to_string()))
}

fn stats_to_report(stats: &Stats, last_error: Option<String>) -> Result<proto::ReportList, Status> {
    let mut metrics = Vec::with_capacity(stats.num_metric());
    for idx in 0..stats.num_metric() {
        let to_status = |e: runtime::RtdError| Status::internal(e.to_string());
        metrics.push(proto::Metric {
            name: stats.metric_name(idx).map_err(to_status)?.to_string(),
            count: stats.count(idx).map_err(to_status)?,
            first: stats.first(idx).map_err(to_status)?,
            last: stats.last(idx).map_err(to_status)?,
            min: stats.min(idx).map_err(to_status)?,
            max: stats.max(idx).map_err(to_status)?,
            mean: stats.mean(idx).map_err(to_status)?,
            std: stats.std(idx).map_err(to_status)?,
        });
    }
    Ok(proto::ReportList {
        metrics,
        last_error: last_error.unwrap_or_default(),
    })
}

fn now_as_timespec() -> proto::TimeSpec {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    proto::TimeSpec {
        seconds: since_epoch.as_secs() as i64,
        nanos: since_epoch.subsec_nanos() as i32,
    }
}

#[tonic::async_trait]
impl RtdService for RtdServiceImpl {
    async fn set_policy(&self, request: Request<proto::Policy>) -> Result<Response<proto::Policy>, Status> {
        let policy = proto_to_policy(request.into_inner())?;
        let previous = self.shared.set_policy(policy);
        Ok(Response::new(policy_to_proto(&previous)))
    }

    async fn get_report(
        &self,
        _request: Request<proto::ReportRequest>,
    ) -> Result<Response<proto::ReportList>, Status> {
        let stats = self.shared.snapshot_stats();
        let last_error = self.shared.last_error();
        Ok(Response::new(stats_to_report(&stats, last_error)?))
    }

    async fn add_child_host(&self, request: Request<proto::Url>) -> Result<Response<proto::TimeSpec>, Status> {
        self.child_hosts.add(request.into_inner().value);
        Ok(Response::new(now_as_timespec()))
    }

    async fn remove_child_host(&self, request: Request<proto::Url>) -> Result<Response<proto::TimeSpec>, Status> {
        self.child_hosts.remove(&request.into_inner().value);
        Ok(Response::new(now_as_timespec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_policy_echoes_previous_and_installs_new() {
        let shared = SharedState::new(Policy::default());
        let child_hosts = Arc::new(ChildHostRegistry::new());
        let service = RtdServiceImpl::new(shared.clone(), child_hosts);

        let request = Request::new(proto::Policy {
            agent: "monitor".to_string(),
            period_seconds: 1.0,
            profile: "default".to_string(),
            params: vec![],
        });
        let response = service.set_policy(request).await.unwrap().into_inner();
        assert_eq!(response.agent, Policy::default().agent.as_str());

        let installed = shared.take_updated_policy().unwrap();
        assert_eq!(installed.agent.as_str(), "monitor");
    }

    #[tokio::test]
    async fn get_report_surfaces_last_error() {
        let shared = SharedState::new(Policy::default());
        shared.record_loop_error("msr read failed".to_string());
        let child_hosts = Arc::new(ChildHostRegistry::new());
        let service = RtdServiceImpl::new(shared, child_hosts);

        let report = service
            .get_report(Request::new(proto::ReportRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(report.last_error, "msr read failed");
    }

    #[tokio::test]
    async fn add_and_remove_child_host_round_trip() {
        let shared = SharedState::new(Policy::default());
        let child_hosts = Arc::new(ChildHostRegistry::new());
        let service = RtdServiceImpl::new(shared, child_hosts.clone());

        service
            .add_child_host(Request::new(proto::Url {
                value: "grpc://child:50051".to_string(),
            }))
            .await
            .unwrap();
        assert!(!child_hosts.add("grpc://child:50051".to_string()));

        service
            .remove_child_host(Request::new(proto::Url {
                value: "grpc://child:50051".to_string(),
            }))
            .await
            .unwrap();
        assert!(child_hosts.add("grpc://child:50051".to_string()));
    }

    #[test]
    fn rejects_unknown_agent_as_invalid_argument() {
        let err = proto_to_policy(proto::Policy {
            agent: "not-a-real-agent".to_string(),
            period_seconds: 1.0,
            profile: String::new(),
            params: vec![],
        })
        .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
