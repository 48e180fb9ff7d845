// Seed records and their database rows
//
// Users, customers, invoices and monthly revenue as they arrive from seed
// input, plus the conversion of each into the row that gets upserted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::gateway::Row;
use crate::password::{hash_password, BcryptError};

// ============================================================================
// ENTITY KIND
// ============================================================================

/// The four seeded entity types, named after their tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Users,
    Customers,
    Invoices,
    Revenue,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Users,
        EntityKind::Customers,
        EntityKind::Invoices,
        EntityKind::Revenue,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Customers => "customers",
            EntityKind::Invoices => "invoices",
            EntityKind::Revenue => "revenue",
        }
    }

    /// Natural key used for upserts.
    pub fn conflict_key(&self) -> &'static str {
        match self {
            EntityKind::Revenue => "month",
            _ => "id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

// ============================================================================
// SEED RECORDS
// ============================================================================

/// Account with a plaintext password, as supplied by seed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
        }
    }
}

/// Invoice seed record. `id` is optional in seed input; see [`Invoice::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub id: Option<String>,
    pub customer_id: String,
    /// Amount in cents. Never negative.
    pub amount: i64,
    pub status: InvoiceStatus,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    pub month: String,
    pub revenue: i64,
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

impl User {
    /// Row to persist. The password column only ever receives the bcrypt hash.
    pub fn to_row(&self) -> Result<Row, BcryptError> {
        let hashed = hash_password(&self.password)?;
        Ok(object(json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "password": hashed,
        })))
    }
}

impl Customer {
    pub fn to_row(&self) -> Row {
        object(json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "image_url": self.image_url,
        }))
    }
}

impl Invoice {
    /// Stable identity: the supplied id, or one derived from the invoice
    /// contents so that reseeding the same input overwrites instead of
    /// inserting a second copy.
    pub fn key(&self) -> String {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }

        let digest = Sha256::new()
            .chain_update(self.customer_id.as_bytes())
            .chain_update(b"|")
            .chain_update(self.amount.to_string().as_bytes())
            .chain_update(b"|")
            .chain_update(self.status.as_str().as_bytes())
            .chain_update(b"|")
            .chain_update(self.date.to_string().as_bytes())
            .finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        uuid::Uuid::from_bytes(bytes).to_string()
    }

    pub fn to_row(&self) -> Row {
        object(json!({
            "id": self.key(),
            "customer_id": self.customer_id,
            "amount": self.amount,
            "status": self.status.as_str(),
            "date": self.date.to_string(),
        }))
    }
}

impl Revenue {
    pub fn to_row(&self) -> Row {
        object(json!({
            "month": self.month,
            "revenue": self.revenue,
        }))
    }
}
