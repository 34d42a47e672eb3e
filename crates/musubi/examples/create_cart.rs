//! Cart creation saga against an in-memory store.
//!
//! Demonstrates:
//! - Declaring a step graph as JSON
//! - Aliasing the workflow input and earlier outputs into handler inputs
//! - Rolling back a created cart when line item generation fails
//!
//! Run twice: once with a known variant, once with an unknown one.

use musubi::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Store {
    carts: Mutex<HashMap<String, Value>>,
    next_id: Mutex<u32>,
}

impl Store {
    fn create_cart(&self, cart: Value) -> Result<Value, HandlerError> {
        let mut next_id = self
            .next_id
            .lock()
            .map_err(|_| HandlerError::new("store poisoned"))?;
        *next_id += 1;
        let id = format!("cart_{:02}", *next_id);

        let mut cart = cart;
        cart["id"] = json!(id);
        self.carts
            .lock()
            .map_err(|_| HandlerError::new("store poisoned"))?
            .insert(id, cart.clone());
        Ok(cart)
    }

    fn remove_cart(&self, id: &str) -> Result<(), HandlerError> {
        self.carts
            .lock()
            .map_err(|_| HandlerError::new("store poisoned"))?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HandlerError::new(format!("cart {} not found", id)))
    }

    fn cart_count(&self) -> usize {
        self.carts.lock().map(|carts| carts.len()).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct CreateCartInput<'a> {
    region_id: &'a str,
    email: &'a str,
    variant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Cart {
    id: String,
    region_id: String,
    customer_id: String,
    items: Vec<Value>,
}

fn graph() -> Result<StepGraph, WorkflowError> {
    StepGraph::from_json(json!({
        "next": {
            "action": "findRegion",
            "noCompensation": true,
            "next": {
                "action": "findOrCreateCustomer",
                "noCompensation": true,
                "next": {
                    "action": "createCart",
                    "next": {
                        "action": "generateLineItems",
                        "noCompensation": true,
                        "next": { "action": "attachLineItems", "noCompensation": true }
                    }
                }
            }
        }
    }))
}

fn registry(store: Arc<Store>) -> Result<Registry, WorkflowError> {
    let find_region = HandlerBinding::new(invoke_fn(|input: Value| async move {
        match input["regionId"].as_str() {
            Some(id) if id.starts_with("reg_") => Ok(json!({ "id": id, "currency": "eur" })),
            _ => Err(HandlerError::new("region not found")),
        }
    }))
    .with_input([AliasRef::input("regionId").field("region_id")]);

    let find_or_create_customer = HandlerBinding::new(invoke_fn(|input: Value| async move {
        let email = input["email"]
            .as_str()
            .ok_or_else(|| HandlerError::new("email is required"))?;
        Ok::<_, HandlerError>(json!({ "id": "cus_01", "email": email }))
    }))
    .with_input([AliasRef::input("email").field("email")]);

    let create_cart = {
        let created = store.clone();
        let removed = store;
        HandlerBinding::new(invoke_fn(move |input: Value| {
            let store = created.clone();
            async move {
                store.create_cart(json!({
                    "region_id": input["region"]["id"],
                    "customer_id": input["customer"]["id"],
                    "items": [],
                }))
            }
        }))
        .with_input([
            AliasRef::action("findRegion", "region"),
            AliasRef::action("findOrCreateCustomer", "customer"),
        ])
        .with_compensation(compensate_fn(move |input: Value| {
            let store = removed.clone();
            async move {
                let id = input["cart"]
                    .as_str()
                    .ok_or_else(|| HandlerError::new("cart id missing"))?;
                println!("Removing cart {}", id);
                store.remove_cart(id)
            }
        }))
        .with_compensation_input([AliasRef::action("createCart", "cart").field("id")])
        .with_timeout(Duration::from_secs(5))
    };

    let generate_line_items = HandlerBinding::new(invoke_fn(|input: Value| async move {
        match input["variantId"].as_str() {
            Some("var_shirt") => Ok(json!([{ "variant_id": "var_shirt", "quantity": 1 }])),
            Some(other) => Err(HandlerError::new(format!("variant {} not found", other))),
            None => Err(HandlerError::new("variant id is required")),
        }
    }))
    .with_input([AliasRef::input("variantId").field("variant_id")]);

    let attach_line_items = HandlerBinding::new(invoke_fn(|input: Value| async move {
        let mut cart = input["cart"].clone();
        cart["items"] = input["items"].clone();
        Ok::<_, HandlerError>(cart)
    }))
    .with_input([
        AliasRef::action("createCart", "cart"),
        AliasRef::action("generateLineItems", "items"),
    ]);

    let mut registry = Registry::new();
    registry.register(
        "create-cart",
        graph()?,
        [
            ("findRegion", find_region),
            ("findOrCreateCustomer", find_or_create_customer),
            ("createCart", create_cart),
            ("generateLineItems", generate_line_items),
            ("attachLineItems", attach_line_items),
        ],
    )?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(Store::default());
    let workflows = Workflows::new(Arc::new(registry(store.clone())?));
    let create_cart = workflows.export("create-cart", "attachLineItems")?;

    let cart: Cart = create_cart
        .call(&CreateCartInput {
            region_id: "reg_eu",
            email: "alice@example.com",
            variant_id: "var_shirt",
        })
        .await?;
    println!(
        "Created {} in {} for {} with {} item(s)",
        cart.id,
        cart.region_id,
        cart.customer_id,
        cart.items.len()
    );

    let result = create_cart
        .call::<_, Cart>(&CreateCartInput {
            region_id: "reg_eu",
            email: "bob@example.com",
            variant_id: "var_missing",
        })
        .await;
    match result {
        Ok(cart) => println!("Unexpectedly created {}", cart.id),
        Err(WorkflowError::Execution(failure)) => {
            eprintln!("Workflow failed: {}", failure);
            println!("Rolled back: {:?}", failure.compensated);
        }
        Err(error) => return Err(error.into()),
    }

    println!("Carts in store: {}", store.cart_count());
    Ok(())
}
