use std::time::Duration;

use anyhow::bail;
use ripple_core::prelude::*;
use ripple_exec::{Action, ActionResult, BlockingGuard, EngineConfig, LogicBox, RunMode};
use ripple_persist::{JsonCodec, MemoryStore, Persistence};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Line {
    sku: String,
    cents: u64,
    qty: u32,
}

struct Checkout {
    logic: LogicBox,
    guard: BlockingGuard,
    lines: State<Vec<Line>>,
    coupon: AdvancedState<String>,
    total: AdvancedState<u64>,
    status: State<String>,
}

impl Checkout {
    fn new(persistence: &Persistence) -> Self {
        let guard = BlockingGuard::labeled("checkout-guard");
        let logic = LogicBox::new(EngineConfig {
            name: "checkout".into(),
            guard: Some(guard.clone()),
        });

        let lines = logic.state("lines", Vec::<Line>::new());
        let coupon = logic.advanced("coupon", String::new());
        coupon.set_validator_with(
            |code: &String| code.is_empty() || code.starts_with("SAVE"),
            |code: &String| log::info!("coupon `{code}` refused"),
        );

        // Restore before deriving so the first computed total sees saved lines.
        persistence.bind(&lines, "lines", JsonCodec::new());
        persistence.bind(coupon.as_state(), "coupon", JsonCodec::new());

        let total = logic.derived::<u64>("total");
        total.depends_on_with(&[&lines, &coupon], {
            let lines = lines.clone();
            let coupon = coupon.clone();
            move || {
                let gross: u64 = lines
                    .get_or(Vec::new())
                    .iter()
                    .map(|l| l.cents * u64::from(l.qty))
                    .sum();
                match coupon.get_or(String::new()).as_str() {
                    "" => gross,
                    _ => gross * 9 / 10,
                }
            }
        });
        total.observe("print", |cents| {
            println!("total: {}.{:02}", cents / 100, cents % 100)
        });

        let status = logic.state("status", String::from("editing"));

        Self {
            logic,
            guard,
            lines,
            coupon,
            total,
            status,
        }
    }

    fn back_pressed(&self) {
        let blocked = self.guard.handle_back(|| {
            println!("leaving checkout");
            true
        });
        if blocked {
            println!("back ignored: an order is in flight");
        }
    }
}

struct AddLine {
    lines: State<Vec<Line>>,
    line: Line,
}

impl Action for AddLine {
    async fn run(self) -> ActionResult {
        self.lines.edit(|lines| lines.push(self.line))?;
        Ok(())
    }
}

struct RefreshPrices {
    lines: State<Vec<Line>>,
}

impl Action for RefreshPrices {
    fn mode(&self) -> RunMode {
        RunMode::Solo
    }

    async fn run(self) -> ActionResult {
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.lines
            .edit(|lines| lines.iter_mut().for_each(|l| l.cents += 5))?;
        Ok(())
    }
}

struct PlaceOrder {
    id: u32,
    total: AdvancedState<u64>,
    status: State<String>,
}

impl Action for PlaceOrder {
    fn mode(&self) -> RunMode {
        RunMode::Sequential
    }

    async fn run(self) -> ActionResult {
        let total = self.total.get()?;
        if total == 0 {
            bail!("order {} has nothing to pay for", self.id);
        }
        self.status.set(format!("placing order {}", self.id));
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.status.set(format!("order {} placed for {total} cents", self.id));
        Ok(())
    }
}

async fn session(checkout: &Checkout) -> anyhow::Result<()> {
    let engine = checkout.logic.engine();

    for (sku, cents) in [("tea", 450), ("mug", 1200)] {
        engine
            .submit(AddLine {
                lines: checkout.lines.clone(),
                line: Line {
                    sku: sku.into(),
                    cents,
                    qty: 1,
                },
            })
            .await?;
    }

    checkout.coupon.set("FREESTUFF".into());
    checkout.coupon.set("SAVE10".into());

    let refresh = || RefreshPrices {
        lines: checkout.lines.clone(),
    };
    let (first, second) = tokio::join!(engine.submit(refresh()), engine.submit(refresh()));
    println!("refresh: {:?} / {:?}", first?, second?);

    let order = |id| PlaceOrder {
        id,
        total: checkout.total.clone(),
        status: checkout.status.clone(),
    };
    let placing = async {
        tokio::join!(
            engine.submit_wrapped(order(1)),
            engine.submit_wrapped(order(2)),
        )
    };
    let pressing = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        checkout.back_pressed();
    };
    let ((one, two), ()) = tokio::join!(placing, pressing);
    println!("orders: {:?} / {:?}", one?, two?);
    println!("status: {}", checkout.status.get()?);

    checkout.back_pressed();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let store = MemoryStore::new();
    let persistence = Persistence::new(store.clone()).with_prefix("checkout");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let checkout = Checkout::new(&persistence);
    rt.block_on(session(&checkout))?;
    checkout.logic.cleanup();

    println!("saved keys: {:?}", store.keys());
    let reopened = Checkout::new(&persistence);
    println!(
        "reopened with {} lines, total {:?}",
        reopened.lines.get_or(Vec::new()).len(),
        reopened.total.get()?
    );
    reopened.logic.cleanup();
    Ok(())
}
