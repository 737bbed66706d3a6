//! Configuration manager for autha-reset.
//!
//! A [`Configuration`] is built once at boot, either by hand, from a
//! `config.yaml` file, or through the process-wide [`configure`] helper,
//! and only read afterwards.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::{HmacVerifier, MessageVerifier};
use crate::error::{Error, Result};
use crate::guard::{Guard, GuardChain};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_USER_MODEL: &str = "User";
const DEFAULT_REDIRECT_URL: &str = "/";
const DEFAULT_COOKIE_NAME: &str = "remember_token";
const DEFAULT_COOKIE_EXPIRATION: Duration =
    Duration::from_secs(60 * 60 * 24 * 365); // 1 year.
const DEFAULT_RESET_TIME_LIMIT: Duration = Duration::from_secs(60 * 15); // 15 minutes.

static CONFIGURATION: LazyLock<RwLock<Arc<Configuration>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Configuration::default())));

/// Apply `f` to the process-wide configuration.
///
/// Readers that already hold an [`Arc`] keep their snapshot; later calls to
/// [`configuration`] observe the update. Last write wins.
pub fn configure(f: impl FnOnce(&mut Configuration)) {
    let mut current =
        CONFIGURATION.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = Configuration::clone(&current);
    f(&mut next);
    *current = Arc::new(next);
}

/// Current process-wide configuration.
pub fn configuration() -> Arc<Configuration> {
    let current = CONFIGURATION.read().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&current)
}

/// Replace the process-wide configuration with defaults.
pub fn restore_default() {
    let mut current =
        CONFIGURATION.write().unwrap_or_else(PoisonError::into_inner);
    *current = Arc::new(Configuration::default());
}

/// Name of the model representing users.
///
/// Request parameter keys are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserModel(String);

impl UserModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Snake-cased key: `CustomUser` gives `custom_user`, `Admin::User` gives
    /// `admin_user`.
    pub fn param_key(&self) -> String {
        let mut key = String::with_capacity(self.0.len() + 4);
        let mut previous: Option<char> = None;

        for c in self.0.chars() {
            match c {
                ':' => {
                    if previous != Some(':') && !key.is_empty() {
                        key.push('_');
                    }
                },
                c if c.is_uppercase() => {
                    if previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
                    {
                        key.push('_');
                    }
                    key.extend(c.to_lowercase());
                },
                c => key.push(c),
            }
            previous = Some(c);
        }

        key
    }
}

impl Default for UserModel {
    fn default() -> Self {
        Self(DEFAULT_USER_MODEL.to_owned())
    }
}

impl fmt::Display for UserModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Self-service actions on user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Create,
}

/// Shared [`MessageVerifier`] slot, freshly keyed by default.
#[derive(Clone)]
struct Verifier(Arc<dyn MessageVerifier>);

impl Default for Verifier {
    fn default() -> Self {
        Self(Arc::new(HmacVerifier::random()))
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Verifier(..)")
    }
}

/// Signing secret read from the configuration file.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
struct SecretKey(String);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Settings of the authentication subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Configured user model.
    /// `None` means the conventional `User` model.
    user_model: Option<UserModel>,
    /// Set the `Secure` flag on the remember cookie.
    pub secure_cookie: bool,
    /// Set the `HttpOnly` flag on the remember cookie.
    pub httponly: bool,
    /// Sign the remember cookie.
    pub signed_cookie: bool,
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_path: Option<String>,
    #[serde(with = "seconds")]
    pub cookie_expiration: Duration,
    /// Where users land once their password is updated.
    pub redirect_url: String,
    /// Lifetime of password reset tokens.
    #[serde(with = "seconds")]
    pub password_reset_time_limit: Duration,
    pub allow_sign_up: bool,
    pub allow_password_reset: bool,
    /// Whether the host application mounts the default routes.
    pub routes: bool,
    /// Secret used to build the default verifier.
    #[serde(skip_serializing)]
    secret_key: Option<SecretKey>,
    #[serde(skip)]
    sign_in_guards: Vec<Arc<dyn Guard>>,
    #[serde(skip)]
    message_verifier: Verifier,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            user_model: None,
            secure_cookie: false,
            httponly: true,
            signed_cookie: false,
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            cookie_domain: None,
            cookie_path: None,
            cookie_expiration: DEFAULT_COOKIE_EXPIRATION,
            redirect_url: DEFAULT_REDIRECT_URL.to_owned(),
            password_reset_time_limit: DEFAULT_RESET_TIME_LIMIT,
            allow_sign_up: true,
            allow_password_reset: true,
            routes: true,
            secret_key: None,
            sign_in_guards: Vec::new(),
            message_verifier: Verifier::default(),
        }
    }
}

impl Configuration {
    /// Apply `f` and return the updated configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }

    /// Reads a YAML configuration file.
    ///
    /// A missing or unreadable file falls back to defaults. An invalid
    /// `redirect_url` is an error.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = match Self::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    path = %path.display(),
                    "cannot load configuration file, using defaults"
                );
                return Ok(Self::default());
            },
        };

        config.redirect_url = normalize_redirect_url(&config.redirect_url)?;
        if let Some(SecretKey(secret)) = &config.secret_key {
            config.message_verifier =
                Verifier(Arc::new(HmacVerifier::new(secret)));
        }

        tracing::debug!(path = %path.display(), "configuration loaded");

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Set the user model.
    pub fn set_user_model(&mut self, model: UserModel) {
        self.user_model = Some(model);
    }

    /// User model, `User` unless configured.
    pub fn user_model(&self) -> UserModel {
        self.user_model.clone().unwrap_or_default()
    }

    /// Explicitly configured user model, if any.
    pub fn reload_user_model(&self) -> Option<UserModel> {
        self.user_model.clone()
    }

    /// Parameter key holding user attributes, e.g. `account`.
    pub fn user_parameter(&self) -> String {
        self.user_model().param_key()
    }

    /// Parameter key holding a user id, e.g. `account_id`.
    pub fn user_id_parameter(&self) -> String {
        format!("{}_id", self.user_parameter())
    }

    pub fn allow_sign_up(&self) -> bool {
        self.allow_sign_up
    }

    /// Permitted self-service actions.
    pub fn user_actions(&self) -> Vec<UserAction> {
        if self.allow_sign_up {
            vec![UserAction::Create]
        } else {
            Vec::new()
        }
    }

    pub fn routes_enabled(&self) -> bool {
        self.routes
    }

    pub fn password_reset_time_limit(&self) -> Duration {
        self.password_reset_time_limit
    }

    /// Replace the guards run around sign-in, in order.
    pub fn set_sign_in_guards(&mut self, guards: Vec<Arc<dyn Guard>>) {
        self.sign_in_guards = guards;
    }

    pub fn sign_in_guards(&self) -> GuardChain {
        GuardChain::new(self.sign_in_guards.clone())
    }

    /// Guard names in execution order.
    pub fn guard_stack(&self) -> Vec<&str> {
        self.sign_in_guards.iter().map(|g| g.name()).collect()
    }

    pub fn set_message_verifier(&mut self, verifier: Arc<dyn MessageVerifier>) {
        self.message_verifier = Verifier(verifier);
    }

    pub fn message_verifier(&self) -> Arc<dyn MessageVerifier> {
        Arc::clone(&self.message_verifier.0)
    }
}

/// Accept absolute paths and http(s) URLs.
fn normalize_redirect_url(url: &str) -> Result<String> {
    if url.starts_with('/') && !url.starts_with("//") {
        return Ok(url.to_owned());
    }

    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        _ => Err(Error::RedirectUrl(url.to_owned())),
    }
}

/// (De)serialize a [`Duration`] as whole seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::guard::{GuardError, SignInContext};

    struct DummyGuard;

    impl Guard for DummyGuard {
        fn name(&self) -> &str {
            "dummy"
        }

        fn apply(
            &self,
            context: SignInContext,
        ) -> std::result::Result<SignInContext, GuardError> {
            Ok(context)
        }
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::default();

        assert_eq!(config.user_model(), UserModel::new("User"));
        assert!(!config.secure_cookie);
        assert!(config.httponly);
        assert_eq!(config.cookie_name, "remember_token");
        assert_eq!(config.cookie_domain, None);
        assert_eq!(config.cookie_path, None);
        assert_eq!(config.redirect_url, "/");
        assert_eq!(
            config.password_reset_time_limit(),
            Duration::from_secs(15 * 60)
        );
        assert!(config.allow_sign_up());
        assert_eq!(config.user_actions(), vec![UserAction::Create]);
        assert!(config.routes_enabled());
        assert!(config.guard_stack().is_empty());
        assert!(config.sign_in_guards().is_empty());
    }

    #[test]
    fn test_configure() {
        let config = Configuration::default().configure(|config| {
            config.secure_cookie = true;
            config.redirect_url = "/admin".into();
            config.cookie_domain = Some(".example.com".into());
            config.cookie_path = Some("/user".into());
            config.password_reset_time_limit = Duration::from_secs(3600);
        });

        assert!(config.secure_cookie);
        assert_eq!(config.redirect_url, "/admin");
        assert_eq!(config.cookie_domain.as_deref(), Some(".example.com"));
        assert_eq!(config.cookie_path.as_deref(), Some("/user"));
        assert_eq!(
            config.password_reset_time_limit(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_configure_last_write_wins() {
        let config = Configuration::default()
            .configure(|config| config.redirect_url = "/first".into())
            .configure(|config| config.redirect_url = "/second".into());

        assert_eq!(config.redirect_url, "/second");
    }

    #[test]
    fn test_disabled_sign_up() {
        let config =
            Configuration::default().configure(|c| c.allow_sign_up = false);

        assert!(!config.allow_sign_up());
        assert!(config.user_actions().is_empty());
    }

    #[test]
    fn test_disabled_routes() {
        let config = Configuration::default().configure(|c| c.routes = false);
        assert!(!config.routes_enabled());
    }

    #[test]
    fn test_user_model() {
        let config = Configuration::default();
        assert_eq!(config.reload_user_model(), None);
        assert_eq!(config.user_model().name(), "User");

        let config = config
            .configure(|c| c.set_user_model(UserModel::new("ConfiguredUser")));
        assert_eq!(
            config.reload_user_model(),
            Some(UserModel::new("ConfiguredUser"))
        );
        assert_eq!(config.user_model().name(), "ConfiguredUser");
    }

    #[test]
    fn test_user_parameters() {
        let config = Configuration::default()
            .configure(|c| c.set_user_model(UserModel::new("Account")));
        assert_eq!(config.user_parameter(), "account");
        assert_eq!(config.user_id_parameter(), "account_id");

        let config = Configuration::default()
            .configure(|c| c.set_user_model(UserModel::new("CustomUser")));
        assert_eq!(config.user_parameter(), "custom_user");
        assert_eq!(config.user_id_parameter(), "custom_user_id");

        assert_eq!(Configuration::default().user_parameter(), "user");
    }

    #[test]
    fn test_param_key() {
        assert_eq!(UserModel::new("Admin::User").param_key(), "admin_user");
        assert_eq!(UserModel::new("User2Fa").param_key(), "user2_fa");
    }

    #[test]
    fn test_sign_in_guards() {
        let config = Configuration::default().configure(|c| {
            c.set_sign_in_guards(vec![Arc::new(DummyGuard)]);
        });

        assert_eq!(config.guard_stack(), vec!["dummy"]);
        assert_eq!(config.sign_in_guards().len(), 1);
    }

    #[test]
    fn test_message_verifier() {
        let verifier: Arc<dyn MessageVerifier> =
            Arc::new(HmacVerifier::new("deterministic"));
        let config = Configuration::default()
            .configure(|c| c.set_message_verifier(Arc::clone(&verifier)));

        assert!(Arc::ptr_eq(&config.message_verifier(), &verifier));
    }

    #[test]
    fn test_default_verifiers_are_distinct() {
        let a = Configuration::default().message_verifier();
        let b = Configuration::default().message_verifier();

        let signed = a.generate(b"payload");
        assert!(a.verified(&signed).is_some());
        assert!(b.verified(&signed).is_none());
    }

    #[test]
    fn test_clone_shares_verifier() {
        let config = Configuration::default();
        let clone = config.clone();

        let signed = config.message_verifier().generate(b"payload");
        assert!(clone.message_verifier().verified(&signed).is_some());
    }

    #[test]
    fn test_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "user_model: Account\n\
             secure_cookie: true\n\
             cookie_domain: .example.com\n\
             redirect_url: https://example.com/home\n\
             password_reset_time_limit: 3600\n\
             allow_sign_up: false\n\
             secret_key: shared-secret"
        )
        .unwrap();

        let config = Configuration::read(file.path()).unwrap();
        assert_eq!(config.user_parameter(), "account");
        assert!(config.secure_cookie);
        assert!(config.httponly);
        assert_eq!(config.cookie_domain.as_deref(), Some(".example.com"));
        assert_eq!(config.redirect_url, "https://example.com/home");
        assert_eq!(
            config.password_reset_time_limit(),
            Duration::from_secs(3600)
        );
        assert!(config.user_actions().is_empty());
        assert!(config.routes_enabled());

        let signed = HmacVerifier::new("shared-secret").generate(b"payload");
        assert!(config.message_verifier().verified(&signed).is_some());
    }

    #[test]
    fn test_debug_redacts_secret_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "secret_key: shared-secret").unwrap();

        let config = Configuration::read(file.path()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("shared-secret"));
    }

    #[test]
    fn test_read_missing_file() {
        let config = Configuration::read("/nonexistent/config.yaml").unwrap();
        assert_eq!(config.redirect_url, "/");
        assert_eq!(config.reload_user_model(), None);
    }

    #[test]
    fn test_read_invalid_redirect() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "redirect_url: javascript:alert(1)").unwrap();

        assert!(matches!(
            Configuration::read(file.path()),
            Err(Error::RedirectUrl(_))
        ));
    }

    #[test]
    fn test_normalize_redirect_url() {
        assert_eq!(normalize_redirect_url("/dashboard").unwrap(), "/dashboard");
        assert_eq!(
            normalize_redirect_url("https://example.com").unwrap(),
            "https://example.com/"
        );
        assert!(normalize_redirect_url("//evil.example").is_err());
        assert!(normalize_redirect_url("dashboard").is_err());
    }

    #[test]
    fn test_global_configuration() {
        configure(|config| config.redirect_url = "/global".into());
        let snapshot = configuration();
        assert_eq!(snapshot.redirect_url, "/global");

        restore_default();
        assert_eq!(configuration().redirect_url, "/");
        // Earlier readers keep their snapshot.
        assert_eq!(snapshot.redirect_url, "/global");
    }
}
