//! Prints the callout device of a TI MSP430 LaunchPad (or anything else with USB ID
//! `0451:f432`) whenever one is plugged in or removed.

use std::io;

use iokit_notify::{Handlers, MatchFilter, NotificationPort};

fn main() -> io::Result<()> {
    env_logger::init();

    let filter = MatchFilter::usb_device()
        .vendor_id(0x0451)
        .product_id(0xf432);

    let mut port = NotificationPort::new()?;
    let handlers: Handlers = Handlers::new()
        .on_path_match(|paths| {
            for path in paths {
                println!("attached: {path}");
            }
        })
        .on_path_terminate(|paths| {
            for path in paths {
                println!("detached: {path}");
            }
        });
    port.add_matching_notifications(&filter, handlers)?;

    run(&port)
}

#[cfg(target_os = "macos")]
fn run(port: &NotificationPort) -> io::Result<()> {
    port.run_loop_source().add_to_current_run_loop();
    iokit_notify::run_current_run_loop();
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run(_port: &NotificationPort) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}
