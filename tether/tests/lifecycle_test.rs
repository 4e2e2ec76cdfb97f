use loopback_service::{Behavior, Counters, LoopbackBinding};
use std::sync::Arc;
use std::time::Duration;
use tether::{
    BindingResolver, CallError, ChannelLimits, ChannelState, ClientRequest, ContractDescriptor,
    Fault, LifecyclePolicy, OperationDescriptor, ProxyForge, ServiceClient, Target,
    TransportError,
};

fn contract() -> ContractDescriptor {
    ContractDescriptor::new(
        "echo.EchoService",
        vec![
            OperationDescriptor::new("UnaryEcho"),
            OperationDescriptor::new("Notify").one_way(),
        ],
    )
}

fn client_with(
    binding: LoopbackBinding,
    policy: LifecyclePolicy,
) -> (Arc<ServiceClient>, Counters) {
    let counters = binding.counters();
    let mut resolver = BindingResolver::new();
    resolver.register_binding(Arc::new(binding));
    let forge = ProxyForge::new(resolver);
    let client = forge
        .client(ClientRequest::new(
            contract(),
            policy,
            Target::Resolve {
                binding: "loopback".to_string(),
                address: "loop://svc:7000".to_string(),
            },
        ))
        .unwrap();
    (client, counters)
}

fn billing_fault() -> Fault {
    Fault::new("InvoiceRejected", "invoice failed validation")
        .with_detail(serde_json::json!({"invoice_id": 42, "reason": "empty"}))
}

#[tokio::test]
async fn echo_roundtrip() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::SharedReusable);
    let payload = serde_json::json!({ "message": "hello" });

    let reply = client.invoke("UnaryEcho", payload.clone()).await.unwrap();

    assert_eq!(reply, payload);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.calls(), 1);
    assert_eq!(client.state().await, ChannelState::Opened);
}

#[tokio::test]
async fn channel_is_reused_across_calls() {
    let (client, counters) = client_with(
        LoopbackBinding::echo(),
        LifecyclePolicy::PerSessionThrowable,
    );

    for i in 0..3 {
        client
            .invoke("UnaryEcho", serde_json::json!({ "seq": i }))
            .await
            .unwrap();
    }

    assert_eq!(counters.built(), 1);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.calls(), 3);
    assert_eq!(client.calls_completed().await, 3);
}

#[tokio::test]
async fn configuration_is_refreshed_on_every_acquisition() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::SharedReusable);

    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    client.update_config(|config| {
        config.default_headers.push(("tenant".into(), "a".into()));
    });
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    assert_eq!(counters.configured(), 2);
}

#[tokio::test]
async fn throwable_policy_rethrows_the_unwrapped_fault_detail() {
    let (client, _) = client_with(
        LoopbackBinding::with_behavior(Behavior::Fault(billing_fault())),
        LifecyclePolicy::PerSessionThrowable,
    );

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();

    match &err {
        CallError::RemoteFault(fault) => assert_eq!(fault.code, "InvoiceRejected"),
        other => panic!("expected a remote fault, got {other:?}"),
    }
    assert_eq!(
        err.fault_detail(),
        Some(&serde_json::json!({"invoice_id": 42, "reason": "empty"}))
    );
    assert_eq!(client.state().await, ChannelState::Aborted);
}

#[tokio::test]
async fn unthrowable_policy_absorbs_the_fault() {
    let (client, counters) = client_with(
        LoopbackBinding::with_behavior(Behavior::Fault(billing_fault())),
        LifecyclePolicy::PerSessionUnthrowable,
    );

    let reply = client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    assert_eq!(reply, serde_json::Value::Null);
    assert_eq!(client.state().await, ChannelState::Aborted);
    assert_eq!(client.last_fault().await.unwrap().code, "InvoiceRejected");

    // The discarded channel is re-created on the next call.
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    assert_eq!(counters.built(), 2);
}

#[tokio::test]
async fn per_call_instance_is_disposed_after_exactly_one_call() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::PerCallThrowable);

    let reply = client
        .invoke("UnaryEcho", serde_json::json!({"message": "once"}))
        .await
        .unwrap();
    assert_eq!(reply, serde_json::json!({"message": "once"}));

    // The caller still holds the wrapper, but the channel is gone.
    assert_eq!(counters.closed(), 1);
    assert!(client.is_disposed().await);
    assert_eq!(client.state().await, ChannelState::Absent);

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Disposed));
}

#[tokio::test]
async fn per_call_instance_is_disposed_even_when_the_call_faults() {
    let (client, counters) = client_with(
        LoopbackBinding::with_behavior(Behavior::Fault(billing_fault())),
        LifecyclePolicy::PerCallUnthrowable,
    );

    let reply = client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    assert_eq!(reply, serde_json::Value::Null);
    assert!(client.is_disposed().await);
    assert!(counters.aborted() >= 1);
}

#[tokio::test]
async fn dispose_is_idempotent_and_later_operations_fail_cleanly() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::SharedReusable);
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    client.dispose().await;
    client.dispose().await;
    client.close().await;
    client.abort().await;
    assert_eq!(counters.closed(), 1);

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Disposed));
}

#[tokio::test]
async fn close_falls_back_to_abort_and_never_surfaces_the_failure() {
    let (client, counters) = client_with(
        LoopbackBinding::with_behavior(Behavior::FailClose),
        LifecyclePolicy::PerSessionThrowable,
    );
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    client.close().await;

    assert_eq!(counters.closed(), 0);
    assert_eq!(counters.aborted(), 1);
    assert_eq!(client.state().await, ChannelState::Absent);
}

#[tokio::test]
async fn shared_reusable_client_comes_back_after_close() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::SharedReusable);

    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    client.close().await;
    assert_eq!(client.state().await, ChannelState::Closed);

    // The next acquisition replaces the closed channel with a fresh one.
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    assert_eq!(counters.built(), 2);
    assert_eq!(client.state().await, ChannelState::Opened);
}

#[tokio::test]
async fn failed_open_tears_the_channel_down_and_rethrows() {
    let (client, _) = client_with(
        LoopbackBinding::with_behavior(Behavior::FailOpen),
        LifecyclePolicy::PerSessionThrowable,
    );

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Transport(TransportError::Rejected(_))
    ));
    assert_eq!(client.state().await, ChannelState::Absent);
}

#[tokio::test(start_paused = true)]
async fn open_is_bounded_by_the_binding_timeout() {
    let limits = ChannelLimits {
        open_timeout: Duration::from_millis(50),
        ..ChannelLimits::default()
    };
    let (client, counters) = client_with(
        LoopbackBinding::with_behavior(Behavior::HangOpen).with_limits(limits),
        LifecyclePolicy::PerSessionThrowable,
    );

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::OpenTimeout(_)));
    assert_eq!(counters.aborted(), 1);
}

#[tokio::test]
async fn connection_loss_propagates_as_a_transport_error() {
    let (client, _) = client_with(
        LoopbackBinding::with_behavior(Behavior::Disconnect),
        LifecyclePolicy::PerSessionThrowable,
    );

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Transport(TransportError::ConnectionLost(_))
    ));
}

#[tokio::test]
async fn per_call_instance_is_consumed_even_when_the_operation_is_unknown() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::PerCallThrowable);

    let err = client
        .invoke("Missing", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::UnknownOperation { .. }));

    // The rejected attempt still used up the instance; no channel was built.
    assert!(client.is_disposed().await);
    assert_eq!(counters.built(), 0);

    let err = client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Disposed));
}

#[tokio::test]
async fn unknown_operation_fails_before_any_channel_exists() {
    let (client, counters) = client_with(LoopbackBinding::echo(), LifecyclePolicy::SharedReusable);

    let err = client
        .invoke("Missing", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::UnknownOperation { .. }));
    assert_eq!(counters.built(), 0);
}
