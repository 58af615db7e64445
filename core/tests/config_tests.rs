//! Configuration file round trips

use seabird_core::*;
use std::io::Write;

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.server.host = "irc.example.com".to_string();
    config.server.port = 6697;
    config.server.tls = true;
    config.identity.password = Some("secret".to_string());
    config.bot.capabilities = vec!["multi-prefix".to_string(), "userhost-in-names".to_string()];
    config.bot.commands = vec!["JOIN #seabird".to_string()];
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.server.host, "irc.example.com");
    assert_eq!(loaded.server.port, 6697);
    assert!(loaded.server.tls);
    assert!(loaded.server.tls_verify);
    assert_eq!(loaded.identity.password.as_deref(), Some("secret"));
    assert_eq!(loaded.bot.capabilities, config.bot.capabilities);
    assert_eq!(loaded.bot.commands, config.bot.commands);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_file_errors() {
    assert!(matches!(
        Config::from_file("/nonexistent/seabird.toml"),
        Err(Error::Config(_))
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nport = \"not a number\"").unwrap();
    assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));
}

#[test]
fn test_bot_rejects_invalid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
host = "irc.example.com"

[identity]
nick = ""
user = "seabird"
name = "Seabird Bot"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert!(Bot::new(config).is_err());
}
