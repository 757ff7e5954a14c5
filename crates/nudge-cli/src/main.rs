mod command;
mod plot;
mod table;
mod util;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    command::run()
}
