use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("careplus")
        .about("Clinical records backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CAREPLUS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("supabase-url")
                .long("supabase-url")
                .help("Supabase project URL, example: https://<project>.supabase.co")
                .env("CAREPLUS_SUPABASE_URL")
                .required(true),
        )
        .arg(
            Arg::new("supabase-anon-key")
                .long("supabase-anon-key")
                .help("Supabase anon (publishable) API key, subject to row-level security")
                .env("CAREPLUS_SUPABASE_ANON_KEY")
                .required(true),
        )
        .arg(
            Arg::new("supabase-service-role-key")
                .long("supabase-service-role-key")
                .help("Supabase service-role key for admin operations, bypasses row-level security")
                .env("CAREPLUS_SUPABASE_SERVICE_ROLE_KEY")
                .required(true),
        )
        .arg(
            Arg::new("frontend-origin")
                .long("frontend-origin")
                .help("Origin allowed by CORS")
                .default_value("http://localhost:3000")
                .env("CAREPLUS_FRONTEND_ORIGIN"),
        )
        .arg(
            Arg::new("email-from")
                .long("email-from")
                .help("Sender address for verification-code emails")
                .default_value("no-reply@careplus.dev")
                .env("CAREPLUS_EMAIL_FROM"),
        )
        .arg(
            Arg::new("email-api-url")
                .long("email-api-url")
                .help("HTTP email API endpoint; when unset codes are logged instead of sent")
                .env("CAREPLUS_EMAIL_API_URL"),
        )
        .arg(
            Arg::new("email-api-key")
                .long("email-api-key")
                .help("HTTP email API key")
                .env("CAREPLUS_EMAIL_API_KEY")
                .requires("email-api-url"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CAREPLUS_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 6] = [
        "--supabase-url",
        "https://project.supabase.co",
        "--supabase-anon-key",
        "anon-key",
        "--supabase-service-role-key",
        "service-key",
    ];

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "careplus");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Clinical records backend"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_supabase() {
        let mut args = vec!["careplus", "--port", "8080"];
        args.extend(REQUIRED);

        let command = new();
        let matches = command.get_matches_from(args);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches
                .get_one::<String>("supabase-url")
                .map(|s| s.to_string()),
            Some("https://project.supabase.co".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("supabase-anon-key")
                .map(|s| s.to_string()),
            Some("anon-key".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("supabase-service-role-key")
                .map(|s| s.to_string()),
            Some("service-key".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("frontend-origin")
                .map(|s| s.to_string()),
            Some("http://localhost:3000".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CAREPLUS_SUPABASE_URL", Some("https://project.supabase.co")),
                ("CAREPLUS_SUPABASE_ANON_KEY", Some("anon-key")),
                ("CAREPLUS_SUPABASE_SERVICE_ROLE_KEY", Some("service-key")),
                ("CAREPLUS_PORT", Some("443")),
                ("CAREPLUS_FRONTEND_ORIGIN", Some("https://careplus-front.vercel.app")),
                ("CAREPLUS_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["careplus"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("supabase-url")
                        .map(|s| s.to_string()),
                    Some("https://project.supabase.co".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<String>("frontend-origin")
                        .map(|s| s.to_string()),
                    Some("https://careplus-front.vercel.app".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("CAREPLUS_LOG_LEVEL", Some(level)),
                    ("CAREPLUS_SUPABASE_URL", Some("https://project.supabase.co")),
                    ("CAREPLUS_SUPABASE_ANON_KEY", Some("anon-key")),
                    ("CAREPLUS_SUPABASE_SERVICE_ROLE_KEY", Some("service-key")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["careplus"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").copied(),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("CAREPLUS_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["careplus".to_string()];
                args.extend(REQUIRED.iter().map(|s| (*s).to_string()));

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }

    #[test]
    fn test_email_api_key_requires_url() {
        let mut args = vec!["careplus", "--email-api-key", "secret"];
        args.extend(REQUIRED);

        let command = new();
        assert!(command.try_get_matches_from(args).is_err());
    }
}
