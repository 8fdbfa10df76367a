//! Taxonomy and currency rules. Pure functions, first matching rule wins.

use crate::schema::Currency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const BOPREAL: &str = "Bopreal";
pub const SOVEREIGN_FOREIGN_LAW: &str = "Sob. Ley Extranjera";
pub const SOVEREIGN_LOCAL_LAW: &str = "Sob. Ley Local";

pub const PESO_BOND_PV: &str = "Bono PV";
pub const CER: &str = "CER";
pub const DOLLAR_LINKED: &str = "Dollar linked";
pub const TAMAR_MARGIN: &str = "TAMAR +Margen";
pub const TAMAR_FIXED: &str = "TAMAR con Tasa Fija";

pub const NOTE_LOCAL_LAW: &str = "ON Ley Local";
pub const NOTE_FOREIGN_LAW: &str = "ON Ley Extr.";
pub const NOTE_DOLLAR_LINKED: &str = "ON DDL";

pub const LETRA: &str = "LETRA";
pub const LECAP: &str = "LECAP";
pub const BONCAP: &str = "BONCAP";

/// The individually-sheeted peso bond that is classified on its own.
const PESO_BOND_PV_TICKER: &str = "TO26";

/// Where a peso-bond row was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PesoBondBucket {
    /// Individual per-ticker schedule sheet.
    Individual,
    Cer,
    DollarLinked,
    Tamar,
}

impl PesoBondBucket {
    /// Bucket sheets in processing order.
    pub const SHEETS: [PesoBondBucket; 3] = [
        PesoBondBucket::DollarLinked,
        PesoBondBucket::Cer,
        PesoBondBucket::Tamar,
    ];

    pub fn sheet_name(&self) -> Option<&'static str> {
        match self {
            PesoBondBucket::Individual => None,
            PesoBondBucket::Cer => Some("Bonos_CER"),
            PesoBondBucket::DollarLinked => Some("Bonos_DDL"),
            PesoBondBucket::Tamar => Some("Bonos_TAMAR"),
        }
    }
}

impl fmt::Display for PesoBondBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sheet_name().unwrap_or("INDIV"))
    }
}

pub fn classify_sovereign(ticker: &str) -> &'static str {
    if ticker.starts_with('B') {
        BOPREAL
    } else if ticker.starts_with('G') {
        SOVEREIGN_FOREIGN_LAW
    } else {
        SOVEREIGN_LOCAL_LAW
    }
}

pub fn classify_peso_bond(ticker: &str, bucket: PesoBondBucket) -> &'static str {
    match bucket {
        PesoBondBucket::Individual if ticker == PESO_BOND_PV_TICKER => PESO_BOND_PV,
        PesoBondBucket::Individual => CER,
        PesoBondBucket::Cer => CER,
        PesoBondBucket::DollarLinked => DOLLAR_LINKED,
        PesoBondBucket::Tamar if ticker.starts_with('M') => TAMAR_MARGIN,
        PesoBondBucket::Tamar => TAMAR_FIXED,
    }
}

/// The three named-range membership sets of the notes workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteSets {
    pub local_law: BTreeSet<String>,
    pub foreign_law: BTreeSet<String>,
    pub dollar_linked: BTreeSet<String>,
}

impl NoteSets {
    pub const LOCAL_LAW_NAME: &'static str = "leg_arg";
    pub const FOREIGN_LAW_NAME: &'static str = "leg_eeuu";
    pub const DOLLAR_LINKED_NAME: &'static str = "dl";

    /// Tickers present in more than one set, with the names of the sets.
    pub fn overlaps(&self) -> Vec<(String, Vec<&'static str>)> {
        let all: BTreeSet<&String> = self
            .local_law
            .iter()
            .chain(&self.foreign_law)
            .chain(&self.dollar_linked)
            .collect();

        all.into_iter()
            .filter_map(|ticker| {
                let names = self.memberships(ticker);
                (names.len() > 1).then(|| (ticker.clone(), names))
            })
            .collect()
    }

    pub fn memberships(&self, ticker: &str) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.local_law.contains(ticker) {
            names.push(Self::LOCAL_LAW_NAME);
        }
        if self.foreign_law.contains(ticker) {
            names.push(Self::FOREIGN_LAW_NAME);
        }
        if self.dollar_linked.contains(ticker) {
            names.push(Self::DOLLAR_LINKED_NAME);
        }
        names
    }
}

/// Empty string when the ticker is in none of the sets.
pub fn classify_note(ticker: &str, sets: &NoteSets) -> &'static str {
    if sets.local_law.contains(ticker) {
        NOTE_LOCAL_LAW
    } else if sets.foreign_law.contains(ticker) {
        NOTE_FOREIGN_LAW
    } else if sets.dollar_linked.contains(ticker) {
        NOTE_DOLLAR_LINKED
    } else {
        ""
    }
}

pub fn classify_letter(ticker: &str) -> &'static str {
    if ticker.starts_with('S') {
        LECAP
    } else if ticker.starts_with('T') {
        BONCAP
    } else {
        LETRA
    }
}

/// `USD` for sovereign, Bopreal and note labels unless dollar-linked, else `ARS`.
pub fn currency_for(classification: &str) -> Currency {
    let dollar_prefix = ["Bop", "Sob", "ON"]
        .iter()
        .any(|prefix| classification.starts_with(prefix));

    if dollar_prefix && !classification.contains("DDL") {
        Currency::Usd
    } else {
        Currency::Ars
    }
}
