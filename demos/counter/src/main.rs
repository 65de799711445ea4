use anyhow::Result;
use arbor_core::schemas::{array, derived, extend, object, scalar};
use arbor_core::{LocalScheduler, Value, create_root, run_local_tasks};
use arbor_devtools::Inspector;

fn main() -> Result<()> {
    env_logger::init();

    let counter = extend(
        object()
            .member("count", scalar(0))
            .member("step", scalar(1))
            .member("history", array(scalar(0)))
            .member(
                "parity",
                derived(|v| {
                    let n = v.number_field("count").unwrap_or(0.0) as i64;
                    Ok(Value::from(if n % 2 == 0 { "even" } else { "odd" }))
                }),
            ),
    )
    .named("counter")
    .mutation("increment", |entry, _| {
        let count = entry.member("count")?;
        let step = entry.member("step")?.get()?.as_number().unwrap_or(1.0);
        let next = count.get()?.as_number().unwrap_or(0.0) + step;
        count.set(next)?;
        entry.member("history")?.mutate("push", &[Value::from(next)])?;
        Ok(Value::from(next))
    });

    let root = create_root(counter, LocalScheduler);
    let _count = root.member("count")?.subscribe(|value, previous, _| {
        let previous = previous.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        println!("count: {previous} -> {value}");
    })?;
    let _parity = root
        .member("parity")?
        .subscribe(|value, _, _| println!("parity: {value}"))?;

    for _ in 0..3 {
        root.mutate("increment", &[])?;
        let ran = run_local_tasks()?;
        log::debug!("ran {ran} task(s)");
    }

    root.member("step")?.set(5)?;
    root.mutate("increment", &[])?;
    run_local_tasks()?;

    let mut inspector = Inspector::new();
    inspector.toggle();
    for line in inspector.frame(&root) {
        println!("{line}");
    }

    root.destroy();
    Ok(())
}
