use std::{thread::sleep, time::Duration};

use metrics_exporter_ffwd::RelayBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let mut relay = RelayBuilder::new("ffwd-example")
        .with_host("localhost")
        .with_default_attributes([("component", "example")])
        .with_default_resources([("host", "localhost")])
        .build()
        .expect("failed to build relay");

    relay.emit("startup", 1).expect("failed to emit startup metric");

    // Loop over and over, pretending to do some work.
    loop {
        relay.increment_one("loops");
        relay.timer("work").time(|| sleep(Duration::from_millis(50)));

        if let Err(e) = relay.flush() {
            tracing::error!(error = %e, "Failed to flush metrics.");
        }

        sleep(Duration::from_secs(1));
    }
}
