use secrecy::SecretString;

/// Immutable runtime configuration, constructed once from the CLI matches and
/// passed to every collaborator. There is no ambient settings lookup.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub supabase_url: String,
    pub anon_key: SecretString,
    pub service_role_key: SecretString,
    pub frontend_origin: String,
    pub email_from: String,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(supabase_url: String, anon_key: SecretString, service_role_key: SecretString) -> Self {
        Self {
            supabase_url,
            anon_key,
            service_role_key,
            frontend_origin: String::from("http://localhost:3000"),
            email_from: String::from("no-reply@careplus.dev"),
            email_api_url: None,
            email_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            "https://project.supabase.co".to_string(),
            SecretString::from("anon".to_string()),
            SecretString::from("service".to_string()),
        );
        assert_eq!(args.supabase_url, "https://project.supabase.co");
        assert_eq!(args.anon_key.expose_secret(), "anon");
        assert_eq!(args.service_role_key.expose_secret(), "service");
        assert_eq!(args.frontend_origin, "http://localhost:3000");
        assert!(args.email_api_url.is_none());
    }
}
