// Churn Console - Mock Backend Server
// In-memory stand-in for the real churn analytics API, for demos and
// development without a Django deployment. Credentials: admin / admin.

use churn_console::mockd::{self, MockState};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = env::args()
        .nth(1)
        .or_else(|| env::var("CHURN_MOCK_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1:8000".to_string());

    let state = Arc::new(MockState::seeded());
    let app = mockd::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind mock server address");

    println!("Churn mock backend listening on http://{}", addr);
    println!("  Credentials: {} / {}", mockd::MOCK_USERNAME, mockd::MOCK_PASSWORD);
    println!("  Try: CHURN_API_URL=http://{} cargo run", addr);
    println!("\n  Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("mock server failed");
}
