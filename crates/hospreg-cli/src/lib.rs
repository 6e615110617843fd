//! Wiring between the command line and the registration client.

pub mod cli_args;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use rpassword::prompt_password;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::Receiver;
use tracing::debug;

use cli_args::{
    Cli, Command, EmailCommand, FeedbackCommand, PatientArg, PaymentCommand, ProfileCommand,
    RecordsCommand, RegistrationCommand, ReviewCommand, WaitingCommand,
};
use hospreg_core::models::{PaymentStatus, RegistrationStatus};
use hospreg_core::{
    ApiClient, ClientEvent, Credentials, EnvironmentResolver, FileStore, KeyValueStore,
    NewAccount, NewFeedback, NewPatient, NewReview, NoticeStyle, PageRequest, PasswordReset,
    PaymentQuery, RegistrationKey, RegistrationQuery, ReviewQuery, ScheduleQuery, SecretBackend,
    SessionStore, WaitingKey, config_directory, load_config,
};

/// Build a client from the config file and the persisted session.
pub fn build_client(cli: &Cli) -> Result<ApiClient> {
    let load = load_config();
    for warning in &load.warnings {
        eprintln!("Warning: {warning}");
    }

    let data_dir: PathBuf = cli
        .global
        .data_dir
        .clone()
        .unwrap_or_else(config_directory);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let backend = if cli.global.local_secrets {
        SecretBackend::LocalOnly
    } else {
        SecretBackend::Keyring
    };
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&data_dir, backend));

    let environment = Arc::new(EnvironmentResolver::new(load.config.server, store.clone()));
    environment.bootstrap(cli.global.server_mode.as_deref());

    let session = Arc::new(SessionStore::new(store));
    session.hydrate();
    debug!(data_dir = %data_dir.display(), "Session hydrated");

    Ok(ApiClient::new(environment, session)?)
}

/// Run one command and print its result as JSON on stdout.
pub async fn run(cli: Cli) -> Result<()> {
    let client = build_client(&cli)?;
    let mut events = client.subscribe();
    let signing_in = matches!(cli.command, Command::Login(_));
    let outcome = dispatch(&client, cli.command).await;
    for line in event_lines(&mut events, signing_in) {
        eprintln!("{line}");
    }
    let value = outcome?;
    if !value.is_null() {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

/// Lines to show for the events published during a command. A rejected
/// login also tears down the session; the re-login hint is dropped there.
fn event_lines(events: &mut Receiver<ClientEvent>, signing_in: bool) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::Notice(notice) => match notice.style {
                NoticeStyle::Success => lines.push(notice.text),
                NoticeStyle::Neutral => lines.push(format!("! {}", notice.text)),
            },
            ClientEvent::SessionExpired { .. } if signing_in => {}
            ClientEvent::SessionExpired { .. } => {
                lines.push("Session expired; run `hospreg login` to sign in again.".to_string());
            }
        }
    }
    lines
}

fn to_json(value: impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn read_secret(given: Option<String>, prompt: &str) -> Result<String> {
    match given {
        Some(secret) => Ok(secret),
        None => prompt_password(prompt).context("failed to read password"),
    }
}

async fn patient_id(client: &ApiClient, arg: PatientArg) -> Result<String> {
    if let Some(id) = arg.patient_id {
        return Ok(id);
    }
    client
        .ensure_patient_id()
        .await
        .ok_or_else(|| anyhow!("no patient id known; log in first or pass --patient"))
}

async fn dispatch(client: &ApiClient, command: Command) -> Result<Value> {
    match command {
        Command::Mode(args) => {
            let environment = client.environment();
            if let Some(mode) = args.mode {
                if !environment.set_mode(mode.trim()) {
                    bail!("unknown server mode '{mode}'; expected 'mock' or 'prod'");
                }
            }
            Ok(json!({
                "mode": environment.get_mode().as_str(),
                "baseUrl": environment.base_url(),
            }))
        }
        Command::Login(args) => {
            let password = read_secret(args.password, "Password: ")?;
            let result = client
                .login_user(&Credentials {
                    account: args.account,
                    password,
                })
                .await?;
            let patient_id = client.ensure_patient_id().await;
            Ok(json!({
                "token": result.token,
                "userInfo": result.user_info,
                "patientId": patient_id,
            }))
        }
        Command::Logout => {
            client.logout_user();
            Ok(Value::Null)
        }
        Command::Whoami => {
            client.ensure_patient_id().await;
            let session = client.session().snapshot();
            Ok(json!({
                "loggedIn": session.is_logged_in(),
                "account": session.account,
                "patientId": session.patient_id,
                "userInfo": session.user_info,
                "mode": client.environment().get_mode().as_str(),
            }))
        }
        Command::Register(args) => {
            let password = read_secret(args.password, "New password: ")?;
            let account = NewAccount {
                account: args.account,
                password,
                email: args.email,
                phone: args.phone,
            };
            to_json(client.register_user(&account).await?)
        }
        Command::Departments(args) => match args.search {
            Some(keyword) => to_json(client.search_departments(&keyword).await?),
            None => to_json(client.fetch_departments().await?),
        },
        Command::Doctor(args) => to_json(client.fetch_doctor_detail(&args.doctor_id).await?),
        Command::Schedules(args) => {
            let mut query = ScheduleQuery::new(args.department_id);
            if let Some(date) = args.date {
                query = query.on(date);
            }
            to_json(client.fetch_doctor_schedules(&query).await?)
        }
        Command::Registrations(command) => registrations(client, command).await,
        Command::Waiting(command) => waiting(client, command).await,
        Command::Payments(command) => payments(client, command).await,
        Command::Review(command) => reviews(client, command).await,
        Command::Feedback(command) => feedback(client, command).await,
        Command::Email(EmailCommand::SendCode { email }) => {
            to_json(client.send_email_code(&email).await?)
        }
        Command::Email(EmailCommand::Verify { email, code }) => {
            to_json(client.verify_email(&email, &code).await?)
        }
        Command::ResetPassword(args) => {
            let new_password = read_secret(args.new_password, "New password: ")?;
            let reset = PasswordReset {
                phone: args.phone,
                new_password,
            };
            to_json(client.reset_password(&reset).await?)
        }
        Command::Profile(command) => profile(client, command).await,
        Command::Records(command) => records(client, command).await,
    }
}

async fn registrations(client: &ApiClient, command: RegistrationCommand) -> Result<Value> {
    match command {
        RegistrationCommand::List {
            patient,
            page,
            status,
        } => {
            let mut query =
                RegistrationQuery::new(patient_id(client, patient).await?).page(page.page, page.page_size);
            if let Some(status) = status {
                query = query.status(RegistrationStatus::from(status));
            }
            to_json(client.fetch_registrations(&query).await?)
        }
        RegistrationCommand::Book {
            patient,
            schedule_record_id,
        } => {
            let key = RegistrationKey::new(patient_id(client, patient).await?, schedule_record_id);
            to_json(client.create_registration(&key).await?)
        }
        RegistrationCommand::Show {
            patient,
            schedule_record_id,
        } => {
            let key = RegistrationKey::new(patient_id(client, patient).await?, schedule_record_id);
            to_json(client.fetch_registration(&key).await?)
        }
        RegistrationCommand::Cancel {
            schedule_record_id,
            by_schedule: true,
            ..
        } => to_json(
            client
                .cancel_registration_by_schedule(&schedule_record_id)
                .await?,
        ),
        RegistrationCommand::Cancel {
            patient,
            schedule_record_id,
            by_schedule: false,
        } => {
            let key = RegistrationKey::new(patient_id(client, patient).await?, schedule_record_id);
            to_json(client.cancel_registration(&key).await?)
        }
    }
}

async fn waiting(client: &ApiClient, command: WaitingCommand) -> Result<Value> {
    match command {
        WaitingCommand::Join {
            patient,
            schedule_record_id,
        } => {
            let patient_id = patient_id(client, patient).await?;
            to_json(
                client
                    .create_waiting_registration(&patient_id, &schedule_record_id)
                    .await?,
            )
        }
        WaitingCommand::Cancel {
            patient,
            waiting_id,
        } => {
            let key = WaitingKey::new(waiting_id, patient_id(client, patient).await?);
            to_json(client.cancel_waiting_registration(&key).await?)
        }
        WaitingCommand::Queue { schedule_record_id } => {
            to_json(client.fetch_waiting_queue(&schedule_record_id).await?)
        }
        WaitingCommand::List { patient } => {
            let patient_id = patient_id(client, patient).await?;
            to_json(client.fetch_patient_waiting(&patient_id).await?)
        }
        WaitingCommand::Confirm { waiting_id } => {
            to_json(client.confirm_waiting_registration(&waiting_id).await?)
        }
    }
}

async fn payments(client: &ApiClient, command: PaymentCommand) -> Result<Value> {
    match command {
        PaymentCommand::List {
            patient,
            page,
            status,
        } => {
            let mut query =
                PaymentQuery::new(patient_id(client, patient).await?).page(page.page, page.page_size);
            if let Some(status) = status {
                query = query.status(PaymentStatus::from(status));
            }
            to_json(client.fetch_payment_orders(&query).await?)
        }
        PaymentCommand::Pay { order_id } => to_json(client.pay_order(&order_id).await?),
        PaymentCommand::Cancel { order_id } => {
            to_json(client.cancel_payment_order(&order_id).await?)
        }
    }
}

async fn reviews(client: &ApiClient, command: ReviewCommand) -> Result<Value> {
    match command {
        ReviewCommand::Submit {
            patient,
            doctor_id,
            rating,
            content,
            schedule_record_id,
        } => {
            let review = NewReview {
                doctor_id,
                patient_id: patient_id(client, patient).await?,
                rating,
                content,
                schedule_record_id,
            };
            to_json(client.submit_review(&review).await?)
        }
        ReviewCommand::List {
            doctor_id,
            patient,
            page,
        } => {
            let query = ReviewQuery {
                doctor_id,
                patient_id: patient.patient_id,
                page: PageRequest {
                    page: page.page,
                    page_size: page.page_size,
                },
            };
            to_json(client.fetch_reviews(&query).await?)
        }
    }
}

async fn feedback(client: &ApiClient, command: FeedbackCommand) -> Result<Value> {
    match command {
        FeedbackCommand::Submit {
            patient,
            content,
            contact,
        } => {
            let patient_id = match patient.patient_id {
                Some(id) => Some(id),
                None => client.ensure_patient_id().await,
            };
            let feedback = NewFeedback {
                patient_id,
                content,
                contact,
            };
            to_json(client.submit_feedback(&feedback).await?)
        }
        FeedbackCommand::List { patient, page } => {
            let patient_id = patient_id(client, patient).await?;
            let page = PageRequest {
                page: page.page,
                page_size: page.page_size,
            };
            to_json(client.fetch_feedback(&patient_id, page).await?)
        }
    }
}

async fn profile(client: &ApiClient, command: ProfileCommand) -> Result<Value> {
    match command {
        ProfileCommand::Show => to_json(client.fetch_profile().await?),
        ProfileCommand::Update { fields } => {
            let fields: Map<String, Value> = fields
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            to_json(client.update_profile(fields).await?)
        }
        ProfileCommand::Patients => to_json(client.fetch_patients().await?),
        ProfileCommand::AddPatient {
            name,
            relation,
            id_card,
            phone,
            default,
        } => {
            let patient = NewPatient {
                name,
                relation,
                id_card,
                phone,
                is_default: default,
            };
            to_json(client.add_patient(&patient).await?)
        }
    }
}

async fn records(client: &ApiClient, command: RecordsCommand) -> Result<Value> {
    match command {
        RecordsCommand::Prescriptions => to_json(client.fetch_prescriptions().await?),
        RecordsCommand::History => to_json(client.fetch_medical_records().await?),
        RecordsCommand::Inspections => to_json(client.fetch_inspections().await?),
        RecordsCommand::Inspection { inspection_id } => {
            to_json(client.fetch_inspection_detail(&inspection_id).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hospreg_core::EventBus;

    fn rejected_login(bus: &EventBus) {
        bus.emit(ClientEvent::SessionExpired {
            login_route: "/pages/login/Login".into(),
        });
        bus.notify("密码错误", NoticeStyle::Neutral);
    }

    #[test]
    fn rejected_login_shows_only_the_backend_message() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        rejected_login(&bus);
        assert_eq!(event_lines(&mut events, true), vec!["! 密码错误".to_string()]);
    }

    #[test]
    fn expired_session_elsewhere_asks_to_log_in() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        rejected_login(&bus);
        assert_eq!(
            event_lines(&mut events, false),
            vec![
                "Session expired; run `hospreg login` to sign in again.".to_string(),
                "! 密码错误".to_string(),
            ]
        );
    }
}
