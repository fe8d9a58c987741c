//! A text service that hangs one time in three, called through a guard with
//! a 3 second timeout. Run with `RUST_LOG=fallguard=debug` to see the
//! fallback path being taken.
use fallguard::sync::SyncGuard;
use fallguard::{GuardConfig, Outcome};
use rand::Rng;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SERVICE_TIMEOUT: Duration = Duration::from_millis(3000);

struct TextService {
    guard: SyncGuard<String, String>,
}

impl TextService {
    fn new() -> Self {
        let config = GuardConfig::new(SERVICE_TIMEOUT).with_name("text-service");
        let guard = SyncGuard::new(config)
            .expect("timeout is non-zero")
            .with_fallback(|| Ok(String::from("I am fallback text")));

        TextService { guard }
    }

    fn text(&self) -> Outcome<String, String> {
        self.guard.call(|| {
            if rand::thread_rng().gen_range(0..3) == 0 {
                std::thread::sleep(Duration::from_secs(10));
            }
            Ok(String::from("I am service text"))
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let service = TextService::new();
    for request in 1..=6 {
        println!("GET /test #{request}: {}", service.text());
    }
}
