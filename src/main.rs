use log_forwarder_operator::app::Application;

use std::process;

fn main() {
    let code = match Application::prepare() {
        Ok(app) => app.run(),
        Err(code) => code,
    };
    process::exit(code);
}
