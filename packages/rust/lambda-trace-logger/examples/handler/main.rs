use lambda_runtime::Error;
use lambda_trace_logger::{
    init_telemetry, AnnotationValue, Annotations, HandlerBinding, HandlerError, Invocation,
    InvocationRunner, RunnerConfig, StructuredLogger, SubLoggerOptions, TelemetryConfig,
};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
enum LookupError {
    #[error("order {0} not found")]
    NotFound(u64),
    #[error("inventory service unavailable")]
    Unavailable,
}

/// Shared resources built once per cold start.
#[derive(Clone)]
struct Clients {
    table_name: Arc<String>,
}

/// Nested operation with its own segment.
fn lookup_order(
    logger: &StructuredLogger,
    clients: &Clients,
    order_id: u64,
) -> Result<Value, HandlerError> {
    let lookup = logger
        .create_sub_logger(SubLoggerOptions::new("lookup-order", json!({ "orderId": order_id })))
        .map_err(HandlerError::from_error)?;

    // Stand-in for an SDK call; its client logs go through the adapter
    lookup
        .sdk_logger()
        .info(format!("[AWS dynamodb 200] getItem({})", clients.table_name));

    let roll: f64 = rand::rng().random();
    let outcome = if order_id == 0 {
        Err(LookupError::NotFound(order_id))
    } else if roll < 0.1 {
        Err(LookupError::Unavailable)
    } else {
        Ok(json!({ "orderId": order_id, "status": "shipped" }))
    };

    match outcome {
        Ok(order) => {
            lookup.debug_with("order found", &order);
            lookup.close("Result", &order).map_err(HandlerError::from_error)?;
            Ok(order)
        }
        Err(error) => {
            lookup.warn(error.to_string());
            if let Err(e) = lookup.mark_error() {
                tracing::warn!(error = %e, "failed to flag lookup segment");
            }
            if let Err(e) = lookup.close("Error", error.to_string()) {
                tracing::warn!(error = %e, "failed to close lookup segment");
            }
            Err(HandlerError::from_error(error))
        }
    }
}

async fn handler(invocation: Invocation<Clients>) -> Result<Value, HandlerError> {
    let order_id = invocation
        .event
        .get("orderId")
        .and_then(Value::as_u64)
        .ok_or_else(|| HandlerError::from(json!({ "error": "orderId is required" })))?;

    invocation.logger.info_with(
        "handling order",
        json!({ "orderId": order_id, "region": invocation.context.aws_region }),
    );

    let order = lookup_order(&invocation.logger, &invocation.clients, order_id)?;

    Ok(json!({
        "statusCode": 200,
        "body": order,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let (trace_service, completion_handler) = init_telemetry(TelemetryConfig::default())?;

    let clients = Clients {
        table_name: Arc::new(std::env::var("ORDERS_TABLE").unwrap_or_else(|_| "orders".into())),
    };

    let binding = HandlerBinding::builder()
        .handler(handler)
        .trace_annotations(Annotations::from([(
            "component".to_string(),
            AnnotationValue::from("orders"),
        )]))
        .build();

    InvocationRunner::with_clients(
        binding,
        clients,
        RunnerConfig::builder()
            .trace_service(Arc::new(trace_service))
            .completion_handler(completion_handler)
            .build(),
    )
    .serve()
    .await
}
