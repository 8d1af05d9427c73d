mod admin;
pub use admin::{Admin, AdminStatsPage};

mod dashboard;
pub use dashboard::Dashboard;

mod home;
pub use home::Home;

mod invest;
pub use invest::Invest;

mod login;
pub use login::Login;

mod password;
pub use password::{ForgotPassword, ResetPassword};

mod register;
pub use register::Register;

mod settings;
pub use settings::Settings;

mod status;
pub use status::{NotFound, Unauthorized};

mod transfer;
pub use transfer::{Deposit, Withdraw};

mod verify_email;
pub use verify_email::VerifyEmail;

const MIN_PASSWORD_LEN: usize = 8;

/// Check a new password before it is sent. `confirm` is the repeat field,
/// when the form has one.
fn check_password(password: &str, confirm: Option<&str>) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {MIN_PASSWORD_LEN} characters."));
    }
    if confirm.is_some_and(|c| c != password) {
        return Err("Passwords do not match.".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_password() {
        assert!(check_password("short", None).is_err());
        assert!(check_password("long enough", None).is_ok());
        assert_eq!(
            check_password("long enough", Some("long enougH")),
            Err("Passwords do not match.".to_string())
        );
        assert!(check_password("long enough", Some("long enough")).is_ok());
    }
}
