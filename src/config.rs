use crate::error::{CashflowError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ONEDRIVE_FOLDER: &str = "OneDrive - Luis Domingo Trucco S.A";

/// Filesystem layout of one run. File names may be relative to their
/// directory (`input_dir` for sources, `output_dir` for output and template).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_file: PathBuf,
    pub sovereign_workbook: PathBuf,
    pub notes_workbook: PathBuf,
    pub letters_workbook: PathBuf,
    pub peso_bonds_workbook: PathBuf,
    pub template_file: PathBuf,
    pub archive_dir: PathBuf,
    /// Abort instead of warning when a note is in zero or several
    /// classification sets.
    #[serde(default)]
    pub strict_note_classification: bool,
}

impl CashflowConfig {
    /// Standard layout under a given root folder.
    pub fn with_root(root: &Path) -> Self {
        let output_dir = root.join("inputs").join("Cashflows");
        let template_dir = output_dir.join("viejos y plantilla");

        Self {
            input_dir: root.join("outputs").join("Informes Roic").join("Renta Fija"),
            output_file: PathBuf::from("Cashflows.xlsx"),
            sovereign_workbook: PathBuf::from("BONOS SOBERANOS Y BOPREALES EN DOLARES.xlsm"),
            notes_workbook: PathBuf::from("ONs EN DOLARES.xlsm"),
            letters_workbook: PathBuf::from("LETRAS EN PESOS.xlsm"),
            peso_bonds_workbook: PathBuf::from("BONOS EN PESOS.xlsm"),
            template_file: template_dir.join("Plantilla.xlsx"),
            archive_dir: template_dir,
            output_dir,
            strict_note_classification: false,
        }
    }

    /// Standard layout under the user's synced OneDrive folder.
    pub fn default_for_home() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CashflowError::Config("cannot resolve home directory".to_string()))?;
        Ok(Self::with_root(&home.join(ONEDRIVE_FOLDER)))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("input_dir", &self.input_dir),
            ("output_dir", &self.output_dir),
            ("output_file", &self.output_file),
            ("sovereign_workbook", &self.sovereign_workbook),
            ("notes_workbook", &self.notes_workbook),
            ("letters_workbook", &self.letters_workbook),
            ("peso_bonds_workbook", &self.peso_bonds_workbook),
            ("template_file", &self.template_file),
            ("archive_dir", &self.archive_dir),
        ];
        for (field, path) in fields {
            if path.as_os_str().is_empty() {
                return Err(CashflowError::Config(format!("{} must not be empty", field)));
            }
        }

        if self.template_path() == self.output_path() {
            return Err(CashflowError::Config(format!(
                "template and output resolve to the same file: {}",
                self.output_path().display()
            )));
        }
        Ok(())
    }

    pub fn sovereign_path(&self) -> PathBuf {
        self.input_dir.join(&self.sovereign_workbook)
    }

    pub fn notes_path(&self) -> PathBuf {
        self.input_dir.join(&self.notes_workbook)
    }

    pub fn letters_path(&self) -> PathBuf {
        self.input_dir.join(&self.letters_workbook)
    }

    pub fn peso_bonds_path(&self) -> PathBuf {
        self.input_dir.join(&self.peso_bonds_workbook)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }

    pub fn template_path(&self) -> PathBuf {
        self.output_dir.join(&self.template_file)
    }
}
