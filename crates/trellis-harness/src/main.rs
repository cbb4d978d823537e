#![forbid(unsafe_code)]

//! Trellis demo
//!
//! Renders a keyed list into the in-memory host, shrinks it through a
//! retained state setter, then moves it to a transition and prints what
//! each commit did.
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=trellis=debug cargo run -p trellis-harness --bin trellis-demo -- 12
//! ```
//!
//! The optional argument is the initial item count (default 8).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis_harness::Harness;
use trellis_reconciler::{
    Component, Node, PropValue, ReconcilerConfig, RenderError, SetState, StartTransition,
    component, deps, host, text,
};
use trellis_scheduler::SchedulerConfig;

const DEFAULT_COUNT: i64 = 8;

/// Setters captured from the last render, used to drive updates from outside.
#[derive(Default)]
struct Controls {
    set_count: Option<SetState<i64>>,
    start_transition: Option<StartTransition>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn item_component() -> Component {
    Component::new("Item", |props, hooks| {
        let label = props
            .get("label")
            .map(PropValue::to_string)
            .unwrap_or_default();
        hooks.use_effect(
            {
                let label = label.clone();
                move || {
                    tracing::debug!(%label, "item mounted");
                }
            },
            deps![],
        )?;
        Ok(host("li").child(text(label)).build())
    })
}

fn list_component(initial: i64, controls: Rc<RefCell<Controls>>) -> Component {
    let item = item_component();
    Component::new("List", move |_props, hooks| -> Result<Node, RenderError> {
        let (count, set_count) = hooks.use_state(initial)?;
        let (pending, start_transition) = hooks.use_transition()?;
        {
            let mut controls = controls.borrow_mut();
            controls.set_count = Some(set_count);
            controls.start_transition = Some(start_transition);
        }
        let items = (0..count).map(|i| {
            component(&item)
                .key(format!("item-{i}"))
                .attr("label", format!("item {i}"))
                .build()
        });
        Ok(host("ul")
            .attr("pending", pending)
            .children(items)
            .build())
    })
}

fn main() {
    init_logging();

    let initial = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<i64>().ok())
        .unwrap_or(DEFAULT_COUNT)
        .max(0);

    let harness = Harness::with_config(SchedulerConfig::from_env(), ReconcilerConfig::from_env());
    let controls = Rc::new(RefCell::new(Controls::default()));
    let list = list_component(initial, Rc::clone(&controls));

    let stats = harness.render(component(&list));
    info!(markup_len = harness.markup().len(), ?stats, "mounted");

    let set_count = controls.borrow().set_count.clone();
    if let Some(set_count) = set_count {
        harness.act(|| set_count.update(|n| n / 2));
        info!(
            markup_len = harness.markup().len(),
            stats = ?harness.root().last_commit(),
            "shrunk"
        );
    }

    let (set_count, start_transition) = {
        let controls = controls.borrow();
        (controls.set_count.clone(), controls.start_transition.clone())
    };
    if let (Some(set_count), Some(start_transition)) = (set_count, start_transition) {
        harness.act(|| start_transition.start(|| set_count.set(initial)));
        info!(
            markup_len = harness.markup().len(),
            commits = harness.root().commit_count(),
            stats = ?harness.root().last_commit(),
            "restored in a transition"
        );
    }

    println!("{}", harness.markup());
}
