use loopback_service::LoopbackBinding;
use std::sync::{Arc, Mutex};
use tether::{
    BindingResolver, ClientRequest, ContractDescriptor, CorrelationId, EventKind,
    LifecyclePolicy, OperationDescriptor, ProxyForge, ServiceClient, Target,
};

fn setup() -> (ProxyForge, ContractDescriptor) {
    let mut resolver = BindingResolver::new();
    resolver.register_binding(Arc::new(LoopbackBinding::echo()));
    let contract = ContractDescriptor::new(
        "echo.EchoService",
        vec![OperationDescriptor::new("UnaryEcho")],
    );
    (ProxyForge::new(resolver), contract)
}

fn client_of(forge: &ProxyForge, contract: &ContractDescriptor) -> Arc<ServiceClient> {
    forge
        .client(ClientRequest::new(
            contract.clone(),
            LifecyclePolicy::SharedReusable,
            Target::Resolve {
                binding: "loopback".to_string(),
                address: "loop://svc:7000".to_string(),
            },
        ))
        .unwrap()
}

type Recorded = Arc<Mutex<Vec<(EventKind, CorrelationId, Option<CorrelationId>)>>>;

fn record_events(forge: &ProxyForge) -> Recorded {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    forge.pipeline().subscribe("recorder", move |event| {
        sink.lock()
            .unwrap()
            .push((event.kind, event.correlation_id, event.request_id));
    });
    events
}

#[tokio::test]
async fn one_call_raises_one_correlated_event_pair() {
    let (forge, contract) = setup();
    let events = record_events(&forge);
    let client = client_of(&forge, &contract);

    client
        .invoke("UnaryEcho", serde_json::json!({"message": "hi"}))
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);

    let (send_kind, send_id, send_request_id) = events[0];
    let (recv_kind, recv_id, recv_request_id) = events[1];
    assert_eq!(send_kind, EventKind::SendingRequest);
    assert_eq!(recv_kind, EventKind::ReceivingReply);
    assert_eq!(send_id, recv_id);
    assert_eq!(send_request_id, None);
    assert_eq!(recv_request_id, Some(send_id));
    assert!(!send_id.is_nil());
}

#[tokio::test]
async fn distinct_calls_get_distinct_correlation_ids() {
    let (forge, contract) = setup();
    let events = record_events(&forge);
    let client = client_of(&forge, &contract);

    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();
    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    let first_call_id = events[0].1;
    let second_call_id = events[2].1;
    assert_ne!(first_call_id, second_call_id);
}

#[tokio::test]
async fn events_carry_the_endpoint_and_a_rendered_message() {
    let (forge, contract) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    forge.pipeline().subscribe("probe", move |event| {
        sink.lock()
            .unwrap()
            .push((event.endpoint.address.clone(), event.rendered.clone()));
    });
    let client = client_of(&forge, &contract);

    client
        .invoke("UnaryEcho", serde_json::json!({"message": "hi"}))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for (address, rendered) in seen.iter() {
        assert_eq!(address, "loop://svc:7000");
        assert!(rendered.contains("echo.EchoService/UnaryEcho"));
    }
}

#[tokio::test]
async fn re_registering_a_subscriber_does_not_duplicate_events() {
    let (forge, contract) = setup();
    let events = record_events(&forge);
    // Second registration under the same id replaces the first.
    let duplicate = record_events(&forge);
    let client = client_of(&forge, &contract);

    client.invoke("UnaryEcho", serde_json::json!({})).await.unwrap();

    assert_eq!(events.lock().unwrap().len(), 0);
    assert_eq!(duplicate.lock().unwrap().len(), 2);
    assert_eq!(forge.pipeline().subscriber_count(), 1);
}

#[tokio::test]
async fn faulting_calls_still_raise_the_sending_event() {
    let mut resolver = BindingResolver::new();
    resolver.register_binding(Arc::new(LoopbackBinding::with_behavior(
        loopback_service::Behavior::Fault(tether::Fault::new("Boom", "it broke")),
    )));
    let forge = ProxyForge::new(resolver);
    let events = record_events(&forge);

    let contract = ContractDescriptor::new(
        "echo.EchoService",
        vec![OperationDescriptor::new("UnaryEcho")],
    );
    let client = client_of(&forge, &contract);
    client
        .invoke("UnaryEcho", serde_json::json!({}))
        .await
        .unwrap_err();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, EventKind::SendingRequest);
}
