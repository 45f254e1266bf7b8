//! Core knowledge - hand-authored passages and selection rules
//!
//! A small, code-defined set of topic passages selected by keyword and role
//! heuristics, never by vector similarity. The trigger keywords live in a
//! declarative rule table so adding a topic is one new row, independently
//! testable.

use std::str::FromStr;

// ============================================================================
// Roles
// ============================================================================

/// Caller role, supplied by the surrounding application. Used only for
/// core-knowledge selection heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Lawyer,
    Accountant,
    ExistingOwner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Lawyer => "lawyer",
            Role::Accountant => "accountant",
            Role::ExistingOwner => "existing_owner",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "buyer" => Ok(Role::Buyer),
            "lawyer" => Ok(Role::Lawyer),
            "accountant" => Ok(Role::Accountant),
            "existing_owner" | "owner" => Ok(Role::ExistingOwner),
            other => Err(format!(
                "unknown role '{}' (expected buyer, lawyer, accountant, or existing_owner)",
                other
            )),
        }
    }
}

// ============================================================================
// Core Entries
// ============================================================================

/// A static, hand-authored knowledge passage. Immutable at runtime.
#[derive(Debug, Clone, Copy)]
pub struct CoreKnowledgeEntry {
    pub key: &'static str,
    pub title: &'static str,
    pub content: &'static str,
    pub category: &'static str,
    pub tags: &'static [&'static str],
}

pub const FOREIGN_OWNERSHIP_KEY: &str = "foreign-ownership";
pub const TRUST_STRUCTURES_KEY: &str = "trust-structures";
pub const TAX_AND_DUTY_KEY: &str = "tax-and-duty";

pub static CORE_ENTRIES: &[CoreKnowledgeEntry] = &[
    CoreKnowledgeEntry {
        key: FOREIGN_OWNERSHIP_KEY,
        title: "Foreign Ownership Restrictions",
        content: "Foreign nationals cannot directly own land under the Land Code. \
            Foreign buyers instead hold a registered 30-year lease over the land, \
            renewable by agreement, or own the building structure separately from \
            the land it stands on. Condominium units are the exception: foreigners \
            may own units freehold provided foreign ownership in the building stays \
            within the 49 percent quota.",
        category: "foreign-ownership",
        tags: &["land-code", "lease", "condominium"],
    },
    CoreKnowledgeEntry {
        key: TRUST_STRUCTURES_KEY,
        title: "Bespoke Trust Structures",
        content: "Where a straightforward lease does not fit, ownership can be \
            arranged through a bespoke trust model: the land is held by a licensed \
            trustee company while beneficial use, succession rights, and resale \
            proceeds are secured for the investor by contract. Each structure is \
            reviewed case by case, since nominee shareholding arrangements intended \
            to disguise foreign land ownership are prohibited and unwindable.",
        category: "structuring",
        tags: &["trust", "trustee", "succession"],
    },
    CoreKnowledgeEntry {
        key: TAX_AND_DUTY_KEY,
        title: "Taxes and Transfer Duty",
        content: "A property transfer attracts a 2 percent transfer fee on the \
            appraised value, specific business tax of 3.3 percent when the seller \
            has held the property for under five years, and stamp duty of 0.5 \
            percent otherwise. Withholding tax applies on the seller side and \
            annual land and building tax applies after transfer; lease \
            registrations attract a 1.1 percent combined fee on the total rent.",
        category: "tax",
        tags: &["transfer-fee", "stamp-duty", "withholding"],
    },
];

/// Look up a core entry by key.
pub fn entry(key: &str) -> Option<&'static CoreKnowledgeEntry> {
    CORE_ENTRIES.iter().find(|e| e.key == key)
}

// ============================================================================
// Selection Rules
// ============================================================================

/// One keyword trigger row: any listed keyword (case-insensitive substring
/// of the query) selects the entry.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub keywords: &'static [&'static str],
    pub key: &'static str,
}

/// Evaluated in order; order is also the selection order in the output.
pub static KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["foreign", "ownership"],
        key: FOREIGN_OWNERSHIP_KEY,
    },
    KeywordRule {
        keywords: &["trust", "bespoke"],
        key: TRUST_STRUCTURES_KEY,
    },
    KeywordRule {
        keywords: &["tax", "duty"],
        key: TAX_AND_DUTY_KEY,
    },
];

/// Select core entries for a query and role.
///
/// Keyword rules run first. Accountants always get the tax entry on top of
/// any keyword matches; lawyers with no keyword match at all get the
/// foreign-ownership and trust entries as a comprehensive fallback.
pub fn select_core(query: &str, role: Role) -> Vec<&'static CoreKnowledgeEntry> {
    let lowered = query.to_lowercase();

    let mut keys: Vec<&'static str> = Vec::new();
    for rule in KEYWORD_RULES {
        if rule.keywords.iter().any(|kw| lowered.contains(kw)) {
            keys.push(rule.key);
        }
    }
    let keyword_matched = !keys.is_empty();

    match role {
        Role::Accountant => keys.push(TAX_AND_DUTY_KEY),
        Role::Lawyer if !keyword_matched => {
            keys.push(FOREIGN_OWNERSHIP_KEY);
            keys.push(TRUST_STRUCTURES_KEY);
        }
        _ => {}
    }

    let mut seen = Vec::new();
    let mut selected = Vec::new();
    for key in keys {
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        if let Some(entry) = entry(key) {
            selected.push(entry);
        }
    }
    selected
}

// ============================================================================
// Tests
// ============================================================================
