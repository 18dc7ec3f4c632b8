//! Totals shown under the sales and project tables

use serde::Serialize;
use crate::entity::{MaterialUsage, Project, SalesAgent, SalesProject};
use crate::money::Money;
use crate::storage::Store;
use crate::Result;

/// Commission totals of one sales agent's live projects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionSummary {
    pub sales_id: i64,
    pub sales_name: String,
    pub projects: usize,
    pub total_commission: Money,
    pub total_kb: Money,
    /// Commission minus KB
    pub net_commission: Money,
}

/// Money position of one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub project_id: i64,
    pub name: String,
    pub total_project: Money,
    pub dp: Money,
    pub material_items: usize,
    pub material_cost: Money,
    /// Total minus down payment
    pub remaining: Money,
}

pub fn commission_summary(store: &Store, sales_id: i64, user_id: i64) -> Result<CommissionSummary> {
    let agent: SalesAgent = store.get(sales_id, user_id)?;
    let projects: Vec<SalesProject> = store.list_by_parent(sales_id, user_id)?;

    let total_commission: Money = projects.iter().map(|p| p.commission).sum();
    let total_kb: Money = projects.iter().map(|p| p.kb).sum();
    Ok(CommissionSummary {
        sales_id,
        sales_name: agent.name,
        projects: projects.len(),
        total_commission,
        total_kb,
        net_commission: total_commission - total_kb,
    })
}

pub fn project_summary(store: &Store, project_id: i64, user_id: i64) -> Result<ProjectSummary> {
    let project: Project = store.get(project_id, user_id)?;
    let materials: Vec<MaterialUsage> = store.list_by_parent(project_id, user_id)?;

    Ok(ProjectSummary {
        project_id,
        name: project.name,
        total_project: project.total_project,
        dp: project.dp,
        material_items: materials.len(),
        material_cost: materials.iter().map(|m| m.total).sum(),
        remaining: project.total_project - project.dp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Period;
    use crate::Error;

    #[test]
    fn test_commission_summary() {
        let store = Store::open_in_memory().unwrap();
        let sales = store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        for (commission, kb) in [(500_000, 50_000), (250_000, 0)] {
            let mut project = SalesProject::new(sales, "x", Period::new(2024, 3).unwrap());
            project.commission = Money::new(commission);
            project.kb = Money::new(kb);
            store.insert(&project, 1).unwrap();
        }

        let summary = commission_summary(&store, sales, 1).unwrap();
        assert_eq!(summary.projects, 2);
        assert_eq!(summary.total_commission, Money::new(750_000));
        assert_eq!(summary.total_kb, Money::new(50_000));
        assert_eq!(summary.net_commission, Money::new(700_000));

        assert!(matches!(commission_summary(&store, sales, 2), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_project_summary() {
        let store = Store::open_in_memory().unwrap();
        let project = store
            .insert(&Project::new("Ruko", Money::new(80_000_000), Money::new(30_000_000)), 1)
            .unwrap();
        store.insert(&MaterialUsage::new(project, "Semen", 10.0, Money::new(65_000)), 1).unwrap();
        store.insert(&MaterialUsage::new(project, "Besi", 2.5, Money::new(100_000)), 1).unwrap();

        let summary = project_summary(&store, project, 1).unwrap();
        assert_eq!(summary.material_items, 2);
        assert_eq!(summary.material_cost, Money::new(900_000));
        assert_eq!(summary.remaining, Money::new(50_000_000));
    }
}
