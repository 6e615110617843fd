use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Command-line client for the hospital registration backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "hospreg", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Directory holding the session store (defaults to the config directory).
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// One-time server mode override (`mock` or `prod`).
    #[arg(long, global = true, env = "HOSPREG_SERVER_MODE", value_name = "MODE")]
    pub server_mode: Option<String>,

    /// Seal the token locally instead of using the OS keyring.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub local_secrets: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show or switch the backend mode.
    Mode(ModeArgs),
    /// Sign in with an account and password.
    Login(LoginArgs),
    /// Clear the local session.
    Logout,
    /// Show the current session, resolving the patient id if needed.
    Whoami,
    /// Create a new account.
    Register(RegisterArgs),
    /// List departments, optionally filtered by keyword.
    Departments(DepartmentsArgs),
    /// Show one doctor.
    Doctor(DoctorArgs),
    /// List doctor schedules of a department.
    Schedules(SchedulesArgs),
    #[command(subcommand, alias = "reg")]
    Registrations(RegistrationCommand),
    #[command(subcommand)]
    Waiting(WaitingCommand),
    #[command(subcommand)]
    Payments(PaymentCommand),
    #[command(subcommand)]
    Review(ReviewCommand),
    #[command(subcommand)]
    Feedback(FeedbackCommand),
    #[command(subcommand)]
    Email(EmailCommand),
    /// Reset a password by phone number.
    ResetPassword(ResetPasswordArgs),
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    Records(RecordsCommand),
}

#[derive(Debug, Clone, Args)]
pub struct ModeArgs {
    /// New mode; omit to print the current one.
    #[arg(value_name = "MODE")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub account: String,

    /// Password; prompted for when omitted.
    #[arg(short, long)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub account: String,

    /// Password; prompted for when omitted.
    #[arg(short, long)]
    pub password: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DepartmentsArgs {
    #[arg(short, long, value_name = "KEYWORD")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DoctorArgs {
    #[arg(value_name = "DOCTOR_ID")]
    pub doctor_id: String,
}

#[derive(Debug, Clone, Args)]
pub struct SchedulesArgs {
    #[arg(short, long = "department", value_name = "DEPARTMENT_ID")]
    pub department_id: String,

    /// Schedule date (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Patient selection shared by patient-scoped commands.
#[derive(Debug, Clone, Args, Default)]
pub struct PatientArg {
    /// Patient id; defaults to the signed-in patient.
    #[arg(long = "patient", value_name = "PATIENT_ID")]
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct PageArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long, default_value_t = 10)]
    pub page_size: u32,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RegistrationCommand {
    /// List bookings.
    List {
        #[command(flatten)]
        patient: PatientArg,
        #[command(flatten)]
        page: PageArgs,
        /// Only bookings with this status (e.g. 已预约).
        #[arg(long)]
        status: Option<String>,
    },
    /// Book a schedule slot.
    Book {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: String,
    },
    /// Show one booking.
    Show {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: String,
    },
    /// Cancel a booking.
    Cancel {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: String,
        /// Cancel by schedule record alone.
        #[arg(long, action = ArgAction::SetTrue)]
        by_schedule: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum WaitingCommand {
    /// Join the waiting list of a full slot.
    Join {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: String,
    },
    /// Leave a waiting list.
    Cancel {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(value_name = "WAITING_ID")]
        waiting_id: String,
    },
    /// Show the waiting queue of a slot.
    Queue {
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: String,
    },
    /// List the patient's waiting entries.
    List {
        #[command(flatten)]
        patient: PatientArg,
    },
    /// Confirm a waiting entry as a booking.
    Confirm {
        #[arg(value_name = "WAITING_ID")]
        waiting_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum PaymentCommand {
    List {
        #[command(flatten)]
        patient: PatientArg,
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        status: Option<String>,
    },
    Pay {
        #[arg(value_name = "ORDER_ID")]
        order_id: String,
    },
    Cancel {
        #[arg(value_name = "ORDER_ID")]
        order_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ReviewCommand {
    Submit {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long = "doctor", value_name = "DOCTOR_ID")]
        doctor_id: String,
        /// 1 to 5.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
        #[arg(long)]
        content: String,
        #[arg(long = "schedule", value_name = "SCHEDULE_RECORD_ID")]
        schedule_record_id: Option<String>,
    },
    List {
        #[arg(long = "doctor", value_name = "DOCTOR_ID")]
        doctor_id: Option<String>,
        #[command(flatten)]
        patient: PatientArg,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum FeedbackCommand {
    Submit {
        #[command(flatten)]
        patient: PatientArg,
        #[arg(long)]
        content: String,
        #[arg(long)]
        contact: Option<String>,
    },
    List {
        #[command(flatten)]
        patient: PatientArg,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum EmailCommand {
    /// Send a verification code.
    SendCode {
        #[arg(value_name = "EMAIL")]
        email: String,
    },
    /// Verify an address with the received code.
    Verify {
        #[arg(value_name = "EMAIL")]
        email: String,
        #[arg(value_name = "CODE")]
        code: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ResetPasswordArgs {
    #[arg(long)]
    pub phone: String,

    /// New password; prompted for when omitted.
    #[arg(long)]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ProfileCommand {
    Show,
    /// Update profile fields given as `key=value` pairs.
    Update {
        #[arg(value_name = "KEY=VALUE", required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// List patients attached to the account.
    Patients,
    AddPatient {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "本人")]
        relation: String,
        #[arg(long)]
        id_card: String,
        #[arg(long)]
        phone: String,
        #[arg(long, action = ArgAction::SetTrue)]
        default: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum RecordsCommand {
    Prescriptions,
    History,
    Inspections,
    Inspection {
        #[arg(value_name = "INSPECTION_ID")]
        inspection_id: String,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
