use super::*;

#[test]
fn config_flag_wins_over_environment() {
    unsafe { std::env::set_var("WAYFINDER_ROUTES_FILE", "/from/env.yaml") };

    let cli = Cli::try_parse_from(["wayfinder", "routes", "--config", "/from/flag.yaml"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("/from/flag.yaml"));

    let cli = Cli::try_parse_from(["wayfinder", "check", "/dashboard"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("/from/env.yaml"));
    assert!(matches!(cli.command, Command::Check { ref path } if path == "/dashboard"));

    unsafe { std::env::remove_var("WAYFINDER_ROUTES_FILE") };
    assert!(Cli::try_parse_from(["wayfinder", "routes"]).is_err());
}

#[test]
fn replay_flags_parse() {
    let cli = Cli::try_parse_from([
        "wayfinder",
        "--config",
        "routes.yaml",
        "replay",
        "scenario.jsonl",
        "--latency",
        "/a=50",
        "--missing",
        "/gone",
        "--initial-auth",
        "anonymous",
    ])
    .unwrap();

    let Command::Replay(args) = cli.command else {
        panic!("expected replay");
    };
    assert_eq!(args.latency, vec![("/a".to_owned(), Duration::from_millis(50))]);
    assert_eq!(args.missing, vec!["/gone".to_owned()]);
    assert_eq!(args.initial_auth, InitialAuth::Anonymous);
}

#[test]
fn latency_rejects_malformed_values() {
    assert!(parse_latency("/a").is_err());
    assert!(parse_latency("/a=soon").is_err());
    assert_eq!(parse_latency("/a=b=5"), Ok(("/a=b".to_owned(), Duration::from_millis(5))));
}
