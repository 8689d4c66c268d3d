use serde::Serialize;

use crate::identity::IdentityUser;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub title: &'static str,
    pub value: &'static str,
    /// Month-over-month change in percent
    pub change: f64,
    pub accent: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenuePoint {
    pub month: &'static str,
    pub revenue: u32,
    pub users: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsersPoint {
    pub month: &'static str,
    pub users: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewPoint {
    pub month: &'static str,
    pub revenue: u32,
    pub expenses: u32,
    pub profit: u32,
}

/// Everything the dashboard page shows. The figures are fixed sample data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub kpis: Vec<Kpi>,
    pub revenue: Vec<RevenuePoint>,
    pub users: Vec<UsersPoint>,
    pub overview: Vec<OverviewPoint>,
}

/// Largest value of each chart, used to scale the bars
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPeaks {
    pub revenue: u32,
    pub users: u32,
    pub overview: u32,
}

impl DashboardSummary {
    pub fn sample() -> Self {
        let revenue = [
            ("Jan", 4000, 2400),
            ("Feb", 3000, 1398),
            ("Mar", 5000, 9800),
            ("Apr", 4780, 3908),
            ("May", 5890, 4800),
            ("Jun", 6390, 3800),
            ("Jul", 7490, 4300),
        ];
        let users = [
            ("Jan", 4000),
            ("Feb", 3000),
            ("Mar", 5000),
            ("Apr", 4780),
            ("May", 5890),
            ("Jun", 6390),
            ("Jul", 7490),
        ];
        let overview = [
            ("Jan", 4000, 2400, 1600),
            ("Feb", 5000, 2398, 2602),
            ("Mar", 6000, 3800, 2200),
            ("Apr", 5780, 3908, 1872),
            ("May", 6890, 4800, 2090),
            ("Jun", 7390, 4800, 2590),
            ("Jul", 8490, 5300, 3190),
        ];

        Self {
            kpis: vec![
                Kpi {
                    title: "Total Revenue",
                    value: "$45,231.89",
                    change: 20.1,
                    accent: "purple",
                },
                Kpi {
                    title: "Active Users",
                    value: "2,350",
                    change: 180.1,
                    accent: "blue",
                },
                Kpi {
                    title: "Sales",
                    value: "12,234",
                    change: 19.0,
                    accent: "cyan",
                },
                Kpi {
                    title: "Active Now",
                    value: "573",
                    change: 12.5,
                    accent: "green",
                },
            ],
            revenue: revenue
                .into_iter()
                .map(|(month, revenue, users)| RevenuePoint { month, revenue, users })
                .collect(),
            users: users.into_iter().map(|(month, users)| UsersPoint { month, users }).collect(),
            overview: overview
                .into_iter()
                .map(|(month, revenue, expenses, profit)| OverviewPoint {
                    month,
                    revenue,
                    expenses,
                    profit,
                })
                .collect(),
        }
    }

    pub fn peaks(&self) -> ChartPeaks {
        ChartPeaks {
            revenue: self.revenue.iter().map(|p| p.revenue).max().unwrap_or(0).max(1),
            users: self.users.iter().map(|p| p.users).max().unwrap_or(0).max(1),
            overview: self
                .overview
                .iter()
                .flat_map(|p| [p.revenue, p.expenses, p.profit])
                .max()
                .unwrap_or(0)
                .max(1),
        }
    }
}

/// Header identity: avatar initial and short name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBadge {
    pub initial: String,
    pub name: String,
    pub email: Option<String>,
}

impl UserBadge {
    pub fn new(user: Option<&IdentityUser>) -> Self {
        let email = user.and_then(|u| u.email.clone());
        let initial = email
            .as_deref()
            .and_then(|e| e.chars().next())
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "U".to_string());
        Self {
            initial,
            name: user.map_or("User", IdentityUser::display_name).to_string(),
            email,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub user: UserBadge,
    #[serde(flatten)]
    pub summary: DashboardSummary,
}
