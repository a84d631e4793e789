use {anyhow::Result, clap::Subcommand, vesper_config::VesperConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the user-global config directory.
    Path,
}

pub fn handle_config(action: ConfigAction, config: &VesperConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", vesper_config::to_toml_string(config)?);
        },
        ConfigAction::Path => match vesper_config::config_dir() {
            Some(dir) => println!("{}", dir.display()),
            None => eprintln!("no home directory; only ./vesper.toml is searched"),
        },
    }
    Ok(())
}
