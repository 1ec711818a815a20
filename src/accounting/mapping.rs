//! Bank account number to ledger account resolution
//!
//! Ledger accounts carry the bank account numbers they stand for as a
//! leading run of numbers in their display name: `"1234 5678 Savings"`
//! holds both `1234` and `5678`. Users can point further numbers at an
//! existing one through per-bank overrides.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::Account;
use crate::bank::rules::extract_fields;
use crate::types::AccountMapping;

static ACCOUNT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<accounts>[0-9[:space:]]+) ").expect("valid account prefix pattern")
});

/// Bank account number to ledger account
pub type AccountsMapping = HashMap<String, Account>;

/// Map every number found in the account name prefixes to its account
///
/// Accounts without a numeric prefix are left out. When two accounts claim
/// the same number the later one wins.
pub fn prefix_mapping(accounts: &[Account]) -> AccountsMapping {
    let mut mapping = AccountsMapping::new();

    for account in accounts {
        let fields = extract_fields(&ACCOUNT_PREFIX, &account.name);
        let Some(numbers) = fields.get("accounts") else {
            continue;
        };

        for number in numbers.split_whitespace() {
            mapping.insert(number.to_string(), account.clone());
        }
    }

    mapping
}

/// Ledger account for a bank-local account number
///
/// An override redirects `local` to the account of another number; an
/// override whose target is unknown is ignored.
pub fn resolve_account<'a>(
    mapping: &'a AccountsMapping,
    overrides: Option<&AccountMapping>,
    local: &str,
) -> Option<&'a Account> {
    overrides
        .and_then(|overrides| overrides.get(local))
        .and_then(|target| mapping.get(target))
        .or_else(|| mapping.get(local))
}
