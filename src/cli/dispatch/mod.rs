use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(String::to_string)
            .ok_or_else(|| anyhow!("missing required argument: --{name}"))
    };

    let mut globals = GlobalArgs::new(
        required("supabase-url")?,
        SecretString::from(required("supabase-anon-key")?),
        SecretString::from(required("supabase-service-role-key")?),
    );

    globals.frontend_origin = required("frontend-origin")?;
    globals.email_from = required("email-from")?;
    globals.email_api_url = matches.get_one::<String>("email-api-url").cloned();
    globals.email_api_key = matches
        .get_one::<String>("email-api-key")
        .cloned()
        .map(SecretString::from);

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
    };

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_builds_globals() {
        let matches = commands::new().get_matches_from(vec![
            "careplus",
            "--port",
            "9090",
            "--supabase-url",
            "https://project.supabase.co",
            "--supabase-anon-key",
            "anon-key",
            "--supabase-service-role-key",
            "service-key",
            "--frontend-origin",
            "https://careplus-front.vercel.app",
        ]);

        let (action, globals) = handler(&matches).unwrap();

        let Action::Server { port } = action;
        assert_eq!(port, 9090);
        assert_eq!(globals.supabase_url, "https://project.supabase.co");
        assert_eq!(globals.anon_key.expose_secret(), "anon-key");
        assert_eq!(globals.service_role_key.expose_secret(), "service-key");
        assert_eq!(globals.frontend_origin, "https://careplus-front.vercel.app");
        assert!(globals.email_api_url.is_none());
    }
}
