mod app;

use app::ImgpeekApp;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imgpeek=info".parse()?),
        )
        .init();

    let initial_url = std::env::args().nth(1);
    let app = ImgpeekApp::new(initial_url);
    std::process::exit(app.run());
}
