// Seed datasets
// The built-in demo set, or the same four datasets loaded from CSV files.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

use crate::models::{Customer, Invoice, InvoiceStatus, Revenue, User};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedData {
    pub users: Vec<User>,
    pub customers: Vec<Customer>,
    pub invoices: Vec<Invoice>,
    pub revenue: Vec<Revenue>,
}

impl SeedData {
    /// Demo data for a fresh dashboard.
    pub fn builtin() -> Self {
        let users = vec![User {
            id: "410544b2-4001-4271-9855-fec4b6a6442a".to_string(),
            name: "User".to_string(),
            email: "user@nextmail.com".to_string(),
            password: "123456".to_string(),
        }];

        let customer = |id: &str, name: &str, email: &str, image: &str| Customer {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            image_url: format!("/customers/{}.png", image),
        };

        let customers = vec![
            customer("d6e15727-9fe1-4961-8c5b-ea44a9bd81aa", "Evil Rabbit", "evil@rabbit.com", "evil-rabbit"),
            customer("3958dc9e-712f-4377-85e9-fec4b6a6442a", "Delba de Oliveira", "delba@oliveira.com", "delba-de-oliveira"),
            customer("3958dc9e-742f-4377-85e9-fec4b6a6442a", "Lee Robinson", "lee@robinson.com", "lee-robinson"),
            customer("76d65c26-f784-44a2-ac19-586678f7c2f2", "Michael Novotny", "michael@novotny.com", "michael-novotny"),
            customer("cc27c14a-0acf-4f4a-a6c9-d45682c144b9", "Amy Burns", "amy@burns.com", "amy-burns"),
            customer("13d07535-c59e-4157-a011-f8d2ef4e0cbb", "Balazs Orban", "balazs@orban.com", "balazs-orban"),
        ];

        let invoice = |customer: usize, amount: i64, status: InvoiceStatus, date: (i32, u32, u32)| Invoice {
            id: None,
            customer_id: customers[customer].id.clone(),
            amount,
            status,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap_or_default(),
        };

        use InvoiceStatus::{Paid, Pending};
        let invoices = vec![
            invoice(0, 15795, Pending, (2022, 12, 6)),
            invoice(1, 20348, Pending, (2022, 11, 14)),
            invoice(4, 3040, Paid, (2022, 10, 29)),
            invoice(3, 44800, Paid, (2023, 9, 10)),
            invoice(5, 34577, Pending, (2023, 8, 5)),
            invoice(2, 54246, Pending, (2023, 7, 16)),
            invoice(0, 666, Pending, (2023, 6, 27)),
            invoice(3, 32545, Paid, (2023, 6, 9)),
            invoice(4, 1250, Paid, (2023, 6, 17)),
            invoice(5, 8546, Paid, (2023, 6, 7)),
            invoice(1, 500, Paid, (2023, 8, 19)),
            invoice(5, 8945, Paid, (2023, 6, 3)),
            invoice(2, 1000, Paid, (2022, 6, 5)),
        ];

        let revenue = [2000, 1800, 2200, 2500, 2300, 3200, 3500, 3700, 2500, 2800, 3000, 4800]
            .iter()
            .enumerate()
            .map(|(i, total)| Revenue {
                month: format!("2023-{:02}", i + 1),
                revenue: *total,
            })
            .collect();

        SeedData {
            users,
            customers,
            invoices,
            revenue,
        }
    }

    /// Load `users.csv`, `customers.csv`, `invoices.csv` and `revenue.csv`
    /// from `dir`. Every file must exist; headers name the fields.
    pub fn from_csv_dir(dir: &Path) -> Result<Self> {
        let data = SeedData {
            users: load_csv(&dir.join("users.csv"))?,
            customers: load_csv(&dir.join("customers.csv"))?,
            invoices: load_csv(&dir.join("invoices.csv"))?,
            revenue: load_csv(&dir.join("revenue.csv"))?,
        };
        data.validate()
            .with_context(|| format!("Invalid seed data in {}", dir.display()))?;
        Ok(data)
    }

    /// Reject input the store would refuse for every run: repeated keys
    /// inside one dataset and negative invoice amounts. Cross-table problems (dangling customer ids, an
    /// email reused by another account already stored) are left to the
    /// loader, which reports them per record.
    pub fn validate(&self) -> Result<()> {
        fn unique<'a>(what: &str, keys: impl Iterator<Item = &'a str>) -> Result<()> {
            let mut seen = HashSet::new();
            for key in keys {
                if !seen.insert(key) {
                    bail!("duplicate {} `{}`", what, key);
                }
            }
            Ok(())
        }

        unique("user id", self.users.iter().map(|u| u.id.as_str()))?;
        unique("customer id", self.customers.iter().map(|c| c.id.as_str()))?;
        unique("revenue month", self.revenue.iter().map(|r| r.month.as_str()))?;

        let invoice_keys: Vec<String> = self.invoices.iter().map(Invoice::key).collect();
        unique("invoice", invoice_keys.iter().map(String::as_str))?;

        if let Some(invoice) = self.invoices.iter().find(|i| i.amount < 0) {
            bail!("invoice `{}` has negative amount {}", invoice.key(), invoice.amount);
        }

        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.users.len() + self.customers.len() + self.invoices.len() + self.revenue.len()
    }
}

fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let record: T = result.with_context(|| {
            format!("Failed to deserialize {} record {}", path.display(), line + 1)
        })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_builtin_is_consistent() {
        let data = SeedData::builtin();
        data.validate().unwrap();

        let customer_ids: HashSet<&str> = data.customers.iter().map(|c| c.id.as_str()).collect();
        for invoice in &data.invoices {
            assert!(
                customer_ids.contains(invoice.customer_id.as_str()),
                "Invoice references unknown customer {}",
                invoice.customer_id
            );
        }

        assert_eq!(data.revenue.len(), 12);
        assert!(data.invoices.iter().any(|i| i.amount == 666));
    }

    #[test]
    fn test_validate_rejects_duplicate_month() {
        let mut data = SeedData::builtin();
        data.revenue.push(Revenue {
            month: "2023-01".to_string(),
            revenue: 1,
        });

        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("2023-01"));
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let mut data = SeedData::builtin();
        data.invoices[0].amount = -1;

        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("negative amount -1"));
    }

    #[test]
    fn test_load_from_csv_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("users.csv"),
            "id,name,email,password\nu1,Al,a@x.com,pw\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("customers.csv"),
            "id,name,email,image_url\nc1,Bo,b@x.com,/b.png\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("invoices.csv"),
            "id,customer_id,amount,status,date\n,c1,500,paid,2024-01-01\ninv-2,c1,75,pending,2024-02-03\n",
        )
        .unwrap();
        fs::write(dir.path().join("revenue.csv"), "month,revenue\n2024-01,500\n").unwrap();

        let data = SeedData::from_csv_dir(dir.path()).unwrap();

        assert_eq!(data.record_count(), 5);
        assert_eq!(data.invoices[0].id, None);
        assert_eq!(data.invoices[1].id.as_deref(), Some("inv-2"));
        assert_eq!(data.invoices[1].status, InvoiceStatus::Pending);
        assert_eq!(data.revenue[0].revenue, 500);
    }

    #[test]
    fn test_missing_csv_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = SeedData::from_csv_dir(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("users.csv"));
    }
}
