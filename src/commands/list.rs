// ABOUTME: List command implementation.
// ABOUTME: Prints the configured environment names.

use wharf::config::Config;
use wharf::output::Output;

pub fn list(config: &Config, output: &Output) {
    for name in config.environment_names() {
        output.success(name);
    }
}
