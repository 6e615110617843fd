use clap::Parser;
use hospreg_cli::cli_args::{
    Cli, Command, PaymentCommand, ProfileCommand, RegistrationCommand, ReviewCommand,
    WaitingCommand,
};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("hospreg").chain(args.iter().copied()))
        .expect("arguments parse")
}

#[test]
fn login_without_password_defers_to_prompt() {
    let cli = parse(&["login", "--account", "testuser"]);
    match cli.command {
        Command::Login(args) => {
            assert_eq!(args.account, "testuser");
            assert!(args.password.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn global_flags_apply_after_subcommand() {
    let cli = parse(&["whoami", "--server-mode", "prod", "--local-secrets"]);
    assert_eq!(cli.global.server_mode.as_deref(), Some("prod"));
    assert!(cli.global.local_secrets);
}

#[test]
fn registration_list_defaults_paging() {
    let cli = parse(&["registrations", "list", "--patient", "PAT0001"]);
    match cli.command {
        Command::Registrations(RegistrationCommand::List {
            patient,
            page,
            status,
        }) => {
            assert_eq!(patient.patient_id.as_deref(), Some("PAT0001"));
            assert_eq!((page.page, page.page_size), (1, 10));
            assert!(status.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn registration_alias_and_cancel_by_schedule() {
    let cli = parse(&["reg", "cancel", "--schedule", "SCH1001", "--by-schedule"]);
    assert!(matches!(
        cli.command,
        Command::Registrations(RegistrationCommand::Cancel {
            by_schedule: true,
            ..
        })
    ));
}

#[test]
fn waiting_cancel_takes_positional_id() {
    let cli = parse(&["waiting", "cancel", "WAIT123", "--patient", "PAT0001"]);
    match cli.command {
        Command::Waiting(WaitingCommand::Cancel {
            patient,
            waiting_id,
        }) => {
            assert_eq!(waiting_id, "WAIT123");
            assert_eq!(patient.patient_id.as_deref(), Some("PAT0001"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn review_rating_out_of_range_is_rejected() {
    let result = Cli::try_parse_from([
        "hospreg", "review", "submit", "--doctor", "DOC001", "--rating", "6", "--content", "ok",
    ]);
    assert!(result.is_err());

    let cli = parse(&[
        "review", "submit", "--doctor", "DOC001", "--rating", "5", "--content", "ok",
    ]);
    assert!(matches!(
        cli.command,
        Command::Review(ReviewCommand::Submit { rating: 5, .. })
    ));
}

#[test]
fn schedule_date_must_be_iso() {
    assert!(Cli::try_parse_from([
        "hospreg", "schedules", "--department", "DEP005", "--date", "15/11/2025"
    ])
    .is_err());
    let cli = parse(&["schedules", "--department", "DEP005", "--date", "2025-11-15"]);
    match cli.command {
        Command::Schedules(args) => assert_eq!(args.date.unwrap().to_string(), "2025-11-15"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn profile_update_parses_pairs() {
    let cli = parse(&["profile", "update", "name=张三", "phone=13800138000"]);
    match cli.command {
        Command::Profile(ProfileCommand::Update { fields }) => {
            assert_eq!(
                fields,
                vec![
                    ("name".to_string(), "张三".to_string()),
                    ("phone".to_string(), "13800138000".to_string()),
                ]
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert!(Cli::try_parse_from(["hospreg", "profile", "update", "novalue"]).is_err());
}

#[test]
fn payment_pay_takes_order_id() {
    let cli = parse(&["payments", "pay", "ORD1"]);
    assert!(matches!(
        cli.command,
        Command::Payments(PaymentCommand::Pay { ref order_id }) if order_id == "ORD1"
    ));
}

#[tokio::test]
async fn mode_command_persists_into_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();

    let cli = parse(&["--data-dir", data_dir, "--local-secrets", "mode", "prod"]);
    hospreg_cli::run(cli).await.unwrap();

    let stored = std::fs::read_to_string(dir.path().join("storage.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(document["serverMode"], "prod");

    let cli = parse(&["--data-dir", data_dir, "mode", "staging"]);
    assert!(hospreg_cli::run(cli).await.is_err());
}
