use tsunagi::prelude::*;

// Data structures
#[derive(Debug, Clone)]
struct Order {
    id: String,
    items: Vec<OrderItem>,
    total_amount: u64,
}

#[derive(Debug, Clone)]
struct OrderItem {
    product_id: String,
    quantity: u32,
}

fn order(state: &State) -> Result<&Order, UnitError> {
    state
        .get::<Order>("order")
        .ok_or_else(|| UnitError::fault("order data not found"))
}

// Unit 1: Order Validation
define_unit!(ValidateOrder);

impl Unit for ValidateOrder {
    fn contract(&self) -> Contract {
        Contract::new().input(Field::new("order").typed::<Order>())
    }

    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        println!("Validating order...");
        let order = order(state)?;

        if order.items.is_empty() || order.total_amount == 0 {
            let reason = format!("order {} is empty", order.id);
            return Err(state.fail_with(Attributes::new().with("error", reason)));
        }
        Ok(())
    }
}

// Unit 2: Inventory Reservation
define_unit!(ReserveInventory);

impl Unit for ReserveInventory {
    fn contract(&self) -> Contract {
        Contract::new()
            .input(Field::new("order").typed::<Order>())
            .output(Field::new("reserved").typed::<u32>())
    }

    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        let reserved: u32 = order(state)?.items.iter().map(|item| item.quantity).sum();
        println!("Reserving {reserved} item(s)...");
        state.set("reserved", reserved);
        Ok(())
    }

    fn rollback(&mut self, state: &mut State) -> Result<(), UnitError> {
        if let Some(reserved) = state.remove::<u32>("reserved") {
            println!("Releasing {reserved} reserved item(s)");
        }
        Ok(())
    }
}

// Unit 3: Payment
define_unit!(ChargePayment);

impl Unit for ChargePayment {
    fn contract(&self) -> Contract {
        Contract::new().output(Field::new("transaction_id").typed::<String>())
    }

    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        let order = order(state)?.clone();
        println!("Charging {} for order {}...", order.total_amount, order.id);
        state.set("transaction_id", format!("TX-{}", order.id));
        Ok(())
    }

    fn rollback(&mut self, state: &mut State) -> Result<(), UnitError> {
        if let Some(transaction_id) = state.get::<String>("transaction_id") {
            println!("Refunding transaction {transaction_id}");
        }
        Ok(())
    }
}

// Unit 4: Shipping
define_unit!(ArrangeShipping);

impl Unit for ArrangeShipping {
    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        let order = order(state)?.clone();
        if order.items.iter().any(|item| item.product_id.starts_with("OVERSIZE")) {
            println!("No courier available for order {}", order.id);
            return Err(state.fail_with(
                Attributes::new().with("error", "no courier available".to_string()),
            ));
        }
        state.set("tracking_number", format!("TRACK-{}", order.id));
        Ok(())
    }
}

fn checkout() -> Organizer {
    let fulfilment = Organizer::builder("Fulfilment")
        .add::<ChargePayment>()
        .add::<ArrangeShipping>()
        .build();

    Organizer::builder("Checkout")
        .hooks(HookChain::new().around(|state, next| {
            println!("--- checkout started ---");
            let result = next(state);
            println!("--- checkout finished ---");
            result
        }))
        .add::<ValidateOrder>()
        .add::<ReserveInventory>()
        .add_unit(fulfilment)
        .build()
}

fn run(order: Order) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = checkout().invoke(Attributes::new().with("order", order))?;
    let state = outcome.state();

    match &outcome {
        Outcome::Success(_) => println!(
            "Order successful! Tracking number: {}",
            state
                .get::<String>("tracking_number")
                .map(String::as_str)
                .unwrap_or("-")
        ),
        Outcome::Failure(_) => println!(
            "Order failed: {} (rolled back: {:?})",
            state.get::<String>("error").map(String::as_str).unwrap_or("-"),
            state.audit().rolled_back()
        ),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    run(Order {
        id: "ORD-001".to_string(),
        items: vec![OrderItem {
            product_id: "PROD-1".to_string(),
            quantity: 2,
        }],
        total_amount: 4200,
    })?;

    run(Order {
        id: "ORD-002".to_string(),
        items: vec![OrderItem {
            product_id: "OVERSIZE-SOFA".to_string(),
            quantity: 1,
        }],
        total_amount: 99900,
    })?;

    Ok(())
}
