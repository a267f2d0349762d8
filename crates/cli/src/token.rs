//! `fbook token` - manage the feed access token in the system keychain.

use std::io::{self, BufRead};

use floorbook_config::{
    delete_feed_token, feed_token_env_var, get_feed_token, keychain_available, set_feed_token,
    SecretError,
};

use crate::CliError;

fn secret_err(e: SecretError) -> CliError {
    let hint = match &e {
        SecretError::Unsupported(var) => Some(format!("export {var}=<token> instead")),
        SecretError::Keychain(_) => None,
    };
    CliError {
        code: crate::exit_codes::EXIT_ERROR,
        message: e.to_string(),
        hint,
    }
}

pub fn cmd_token_status(json: bool) -> Result<(), CliError> {
    let lookup = get_feed_token();
    let keychain = keychain_available();

    if json {
        let out = serde_json::json!({
            "token": if lookup.key.is_some() { "present" } else { "missing" },
            "source": lookup.source.as_str(),
            "keychain": if keychain { "ok" } else { "unavailable" },
            "env_var": feed_token_env_var(),
        });
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("Feed token");
    println!("  token:    {}", if lookup.key.is_some() { "present" } else { "missing" });
    println!("  source:   {}", lookup.source.as_str());
    println!("  keychain: {}", if keychain { "ok" } else { "unavailable" });
    println!("  env var:  {}", feed_token_env_var());
    Ok(())
}

/// Store a token. With no argument the token is read from the first line
/// of stdin, so it stays out of shell history.
pub fn cmd_token_set(token: Option<String>) -> Result<(), CliError> {
    let token = match token {
        Some(t) => t,
        None => {
            if atty::is(atty::Stream::Stdin) {
                eprint!("feed token: ");
            }
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| CliError::io(format!("cannot read token from stdin: {e}")))?;
            line
        }
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(CliError::args("empty token"));
    }

    set_feed_token(token).map_err(secret_err)?;
    eprintln!("stored feed token in the system keychain");
    Ok(())
}

pub fn cmd_token_clear() -> Result<(), CliError> {
    delete_feed_token().map_err(secret_err)?;
    eprintln!("removed feed token from the system keychain");
    Ok(())
}
