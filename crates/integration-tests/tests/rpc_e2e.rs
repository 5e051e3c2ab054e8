// JSON-RPC surface end to end: real server, real processes

mod common;

use common::sh;
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::server::ServerHandle;
use lifeguard_api_rpc::error::code;
use lifeguard_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use lifeguard_core::application::{
    shutdown_channel, Dispatcher, ProbeScheduler, Registry, RetryController, ShutdownSender,
};
use lifeguard_core::domain::{Catalog, ProbeSpec};
use lifeguard_core::port::id_provider::SequentialIdProvider;
use lifeguard_core::port::report_sink::mocks::RecordingSink;
use lifeguard_core::port::time_provider::SystemTimeProvider;
use lifeguard_infra_system::SubprocessExecutor;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Agent {
    client: HttpClient,
    server: ServerHandle,
    shutdown: ShutdownSender,
}

async fn start_agent() -> Agent {
    let catalog = Catalog {
        actions: vec![
            sh("greet", "printf 'hello %s' \"$NAME\""),
            sh("reject", "echo 'not a member' >&2; exit 7"),
            sh("dump", "sleep 0.5; echo dumped"),
            sh("hang", "sleep 10").with_timeout_seconds(1),
            sh("alive", "echo ok"),
        ],
        probes: vec![ProbeSpec::new("alive").with_period_seconds(1)],
    };
    let registry = Arc::new(Registry::build(catalog).unwrap());
    let executor = Arc::new(SubprocessExecutor::new());
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        Arc::new(RetryController::new(executor.clone())),
        Arc::new(SequentialIdProvider::default()),
    ));

    let (shutdown, token) = shutdown_channel();
    let probes = ProbeScheduler::new(
        executor,
        Arc::new(RecordingSink::new()),
        Arc::new(SystemTimeProvider),
    )
    .spawn(registry.probes(), token);

    let handler = Arc::new(RpcHandler::new(dispatcher, probes.board()));
    let config = RpcServerConfig {
        port: 0,
        ..Default::default()
    };
    let (addr, server) = RpcServer::new(config, handler).start().await.unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://{}", addr))
        .unwrap();

    Agent {
        client,
        server,
        shutdown,
    }
}

fn object(value: Value) -> ObjectParams {
    let mut params = ObjectParams::new();
    for (key, value) in value.as_object().expect("object params") {
        params.insert(key, value).unwrap();
    }
    params
}

fn call_error(result: Result<Value, ClientError>) -> jsonrpsee::types::ErrorObjectOwned {
    match result {
        Err(ClientError::Call(err)) => err,
        other => panic!("expected call error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invoke_blocking() {
    let agent = start_agent().await;

    let response: Value = agent
        .client
        .request(
            "action.invoke.v1",
            object(json!({"action": "greet", "parameters": {"NAME": "pod-0"}})),
        )
        .await
        .unwrap();

    assert_eq!(response["stdout"], "hello pod-0");
    assert_eq!(response["exitCode"], 0);
    agent.shutdown.shutdown();
    agent.server.stop().unwrap();
}

#[tokio::test]
async fn test_invoke_error_codes() {
    let agent = start_agent().await;

    let err = call_error(
        agent
            .client
            .request("action.invoke.v1", object(json!({"action": "reject"})))
            .await,
    );
    assert_eq!(err.code(), code::EXECUTION_FAILED);
    assert_eq!(err.message(), "not a member\n");
    assert_eq!(err.data().unwrap().get(), r#"{"exitCode":7}"#);

    let err = call_error(
        agent
            .client
            .request(
                "action.invoke.v1",
                object(json!({"action": "reject", "separateStderr": true})),
            )
            .await,
    );
    assert_eq!(err.message(), "exit status: 7");
    let data: Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
    assert_eq!(data["stderr"], "not a member\n");

    let err = call_error(
        agent
            .client
            .request("action.invoke.v1", object(json!({"action": "hang"})))
            .await,
    );
    assert_eq!(err.code(), code::TIMEOUT);

    let err = call_error(
        agent
            .client
            .request("action.invoke.v1", object(json!({"action": "missing"})))
            .await,
    );
    assert_eq!(err.code(), code::NOT_FOUND);

    let err = call_error(
        agent
            .client
            .request(
                "action.invoke.v1",
                object(json!({"action": "greet", "parameters": {"BAD=KEY": "x"}})),
            )
            .await,
    );
    assert_eq!(err.code(), code::VALIDATION_ERROR);

    agent.shutdown.shutdown();
    agent.server.stop().unwrap();
}

#[tokio::test]
async fn test_non_blocking_polling() {
    let agent = start_agent().await;
    let request = || object(json!({"action": "dump", "nonBlocking": true}));

    let err = call_error(agent.client.request("action.invoke.v1", request()).await);
    assert_eq!(err.code(), code::IN_PROGRESS);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let response: Value = agent
        .client
        .request("action.invoke.v1", request())
        .await
        .unwrap();
    assert_eq!(response["stdout"], "dumped\n");
    assert_eq!(response["invocationId"], "inv-1");

    agent.shutdown.shutdown();
    agent.server.stop().unwrap();
}

#[tokio::test]
async fn test_probe_status_and_listing() {
    let agent = start_agent().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let state: Value = agent
        .client
        .request("probe.status.v1", object(json!({"probe": "alive"})))
        .await
        .unwrap();
    assert_eq!(state["status"], "HEALTHY");
    assert_eq!(state["lastOutput"], "ok\n");

    let err = call_error(
        agent
            .client
            .request("probe.status.v1", object(json!({"probe": "ghost"})))
            .await,
    );
    assert_eq!(err.code(), code::NOT_FOUND);

    let listed: Value = agent
        .client
        .request("action.list.v1", ObjectParams::new())
        .await
        .unwrap();
    let names: Vec<_> = listed["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alive", "dump", "greet", "hang", "reject"]);

    agent.shutdown.shutdown();
    agent.server.stop().unwrap();
}
