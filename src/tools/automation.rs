//! Automation rule evaluation.

use super::Catalog;
use crate::crm::automation;

pub fn register(catalog: &mut Catalog) {
    catalog.flow(
        "run_automation_rules",
        "Evaluate active automation rules now. Unreplied conversations get an AI draft reply \
         and are flagged for review. Use this when user says \"Run my automations\"",
        automation::run_automation_rules,
    );
}
