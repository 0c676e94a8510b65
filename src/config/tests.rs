use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.feed.page_size = Some(25);

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        feed_page_size: Some(5),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.feed.page_size.get(), 5);
}

#[test]
fn feed_defaults_to_ten_posts_and_twenty_seconds() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.feed.page_size.get(), 10);
    assert_eq!(settings.feed.cache_ttl, Duration::from_secs(20));
}

#[test]
fn zero_page_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.feed.page_size = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero page size must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "feed.page_size",
            ..
        }
    ));
}

#[test]
fn zero_cache_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.feed.cache_ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "feed.cache_ttl_seconds",
            ..
        }
    ));
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(0);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn shared_public_and_admin_address_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(9000);
    raw.server.admin_port = Some(9000);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn media_limit_can_be_overridden_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        media_max_request_bytes: Some(1_572_864),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.media.max_request_bytes.get(), 1_572_864);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn session_cookie_name_must_be_a_token() {
    let mut raw = RawSettings::default();
    raw.auth.session_cookie = Some("bad name;".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["penfeed"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_group_create_arguments() {
    let args = CliArgs::parse_from([
        "penfeed",
        "groups",
        "create",
        "--database-url",
        "postgres://example",
        "--title",
        "Cats",
        "--description",
        "All about cats",
    ]);

    match args.command.expect("groups command") {
        Command::Groups(GroupsArgs {
            command: GroupsCommand::Create(create),
        }) => {
            assert_eq!(
                create.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(create.title, "Cats");
            assert!(create.slug.is_none());
            assert_eq!(create.description, "All about cats");
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_user_promote_arguments() {
    let args = CliArgs::parse_from(["penfeed", "users", "promote", "leo"]);

    match args.command.expect("users command") {
        Command::Users(UsersArgs {
            command: UsersCommand::Promote(promote),
        }) => {
            assert_eq!(promote.username, "leo");
            assert!(promote.database.database_url.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}
