//! Bancolombia notification format
//!
//! Bancolombia sends one email per movement from a couple of fixed
//! addresses. The body is a single Spanish sentence; the patterns below
//! cover card and account purchases, withdrawals, transfers, QR payments
//! and the usual incomes.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::currency::parse_amount;
use super::rules::{extract_fields, first_match, missing_fields, Rule};
use super::BankDelegate;
use crate::types::{Amount, BankError, Message, TransactionInfo, TransactionKind};

const NAME: &str = "bancolombia";

/// Currency every Bancolombia notification is expressed in
pub const CURRENCY_CODE: &str = "COP";

const SENDERS: [&str; 2] = [
    "alertasynotificaciones@notificacionesbancolombia.com",
    "alertasynotificaciones@bancolombia.com.co",
];

fn rule(pattern: &str, kind: TransactionKind) -> Rule<TransactionKind> {
    Rule::new(Regex::new(pattern).expect("valid bancolombia pattern"), kind)
}

// Order matters: the first matching pattern wins. Word, space and digit
// classes are ASCII-only, so accented words never fill a `type` or `place`.
static RULES: LazyLock<Vec<Rule<TransactionKind>>> = LazyLock::new(|| {
    use TransactionKind::{Expense, Income};

    vec![
        rule(
            r"Bancolombia le informa (?P<type>[[:word:]]+) por \$(?P<value>[0-9,\.]+) a (?P<place>.+) desde (?:cta|T\.CRED) \*(?P<account>[0-9]{4})\.",
            Expense,
        ),
        rule(
            r"Bancolombia le informa (?P<type>[[:word:]]+) por \$(?P<value>[0-9,\.]+) en (?P<place>[^\.]+)\..+T\.Cred \*(?P<account>[0-9]{4})\.",
            Expense,
        ),
        rule(
            r"Bancolombia le informa (?P<type>[[:word:]]+) por \$(?P<value>[0-9,\.]+) en (?P<place>.+)\..+T\.(?:Cred|Deb) \*(?P<account>[0-9]{4})\.",
            Expense,
        ),
        rule(
            r"Bancolombia le informa (?P<type>[[:word:]]+) por \$(?P<value>[0-9,\.]+) desde cta \*(?P<account>[0-9]{4}).+cta (?P<place>[0-9]{9,16})\.",
            Expense,
        ),
        rule(
            r"Realizaste una (?P<type>[[:word:]]+) con QR por \$(?P<value>[0-9,\.]+), desde cta \*(?P<account>[0-9]{4}) a cta (?P<place>[0-9]{9,16})\.",
            Expense,
        ),
        rule(
            r"Bancolombia le informa (?P<type>[[:word:]]+) de pago de (?P<place>[A-Z[:space:]]+) por \$(?P<value>[0-9,\.]+) en su cuenta (?P<account>[A-Z[:space:]]+)[[:space:]].+\.",
            Income,
        ),
        rule(
            r"Bancolombia te informa (?P<type>[[:word:]]+) transferencia de (?P<place>[A-Z[:space:]]+) por \$(?P<value>[0-9,\.]+) en la cuenta \*(?P<account>[0-9]+)\.",
            Income,
        ),
        rule(
            r"Bancolombia le informa un (?P<type>[[:word:]]+) (?P<place>[[:word:][:space:]]+) por \$(?P<value>[0-9,\.]+) en su Cuenta (?P<account>[[:word:]]+)\.",
            Income,
        ),
        rule(
            r"Bancolombia le informa un (?P<type>[[:word:][:space:]]+) de (?P<place>[[:word:][:space:]\.]+) por \$(?P<value>[0-9,\.]+) en su Cuenta (?P<account>[[:word:]]+)\.",
            Income,
        ),
        rule(
            r"Bancolombia te informa (?P<type>[[:word:][:space:]]+) por \$(?P<value>[0-9,\.]+) a (?P<place>[[:word:][:space:]\.]+) desde producto \*(?P<account>[[:word:]]+)\.",
            Expense,
        ),
    ]
});

/// Bancolombia delegate
#[derive(Debug, Clone, Copy, Default)]
pub struct Bancolombia;

impl BankDelegate for Bancolombia {
    fn name(&self) -> &'static str {
        NAME
    }

    fn comes_from(&self, senders: &[String]) -> bool {
        senders
            .iter()
            .any(|sender| SENDERS.contains(&sender.as_str()))
    }

    fn filter_message(&self, message: &Message) -> bool {
        if !self.comes_from(&message.from) {
            return false;
        }

        let keep = first_match(&RULES, &message.body).is_some();
        if !keep {
            tracing::debug!(
                bank = NAME,
                message_id = message.id,
                subject = %message.subject,
                "message from bank did not match any pattern"
            );
        }

        keep
    }

    fn extract_transaction_info(
        self: Arc<Self>,
        message: Arc<Message>,
    ) -> Result<TransactionInfo, BankError> {
        let rule = first_match(&RULES, &message.body).ok_or_else(|| BankError::NoMatch {
            bank: NAME.to_string(),
        })?;

        let mut fields = extract_fields(&rule.pattern, &message.body);

        let missing = missing_fields(&fields);
        if !missing.is_empty() {
            return Err(BankError::MissingFields {
                bank: NAME.to_string(),
                missing,
            });
        }

        let value = fields.remove("value").unwrap_or_default();
        let number = parse_amount(&value).ok_or_else(|| BankError::InvalidAmount {
            bank: NAME.to_string(),
            value: value.clone(),
        })?;

        Ok(TransactionInfo {
            bank: self,
            date: message.date,
            action: fields.remove("type").unwrap_or_default(),
            description: fields.remove("place").unwrap_or_default(),
            account: fields.remove("account").unwrap_or_default(),
            amount: Amount::new(CURRENCY_CODE, number),
            kind: rule.value,
            correlation_id: message.id,
            origin: message,
        })
    }
}
