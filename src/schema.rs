// 📐 Table definitions for the dashboard store
// Every statement is CREATE ... IF NOT EXISTS, so applying them is idempotent.

/// A table the loader must ensure before writing into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub ddl: &'static str,
}

// ============================================================================
// TABLES
// ============================================================================

pub const USERS: TableSpec = TableSpec {
    name: "users",
    ddl: "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            name VARCHAR(255) NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL
        )",
};

pub const CUSTOMERS: TableSpec = TableSpec {
    name: "customers",
    ddl: "CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY NOT NULL,
            name VARCHAR(255) NOT NULL,
            email VARCHAR(255) NOT NULL,
            image_url VARCHAR(255) NOT NULL
        )",
};

pub const INVOICES: TableSpec = TableSpec {
    name: "invoices",
    ddl: "CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY NOT NULL,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            amount INTEGER NOT NULL CHECK (amount >= 0),
            status VARCHAR(255) NOT NULL CHECK (status IN ('pending', 'paid')),
            date DATE NOT NULL
        )",
};

pub const REVENUE: TableSpec = TableSpec {
    name: "revenue",
    ddl: "CREATE TABLE IF NOT EXISTS revenue (
            month VARCHAR(7) NOT NULL UNIQUE,
            revenue INTEGER NOT NULL
        )",
};

/// Creation order. Customers precede invoices for the foreign key.
pub const TABLES: [TableSpec; 4] = [USERS, CUSTOMERS, INVOICES, REVENUE];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    #[test]
    fn test_every_entity_has_a_table() {
        for entity in EntityKind::ALL {
            assert!(
                TABLES.iter().any(|t| t.name == entity.table()),
                "no table for {}",
                entity
            );
        }
    }

    #[test]
    fn test_ddl_is_idempotent() {
        for spec in TABLES {
            assert!(
                spec.ddl.starts_with("CREATE TABLE IF NOT EXISTS"),
                "{} must use IF NOT EXISTS",
                spec.name
            );
        }
    }

    #[test]
    fn test_customers_created_before_invoices() {
        let pos = |name: &str| TABLES.iter().position(|t| t.name == name).unwrap();
        assert!(pos("customers") < pos("invoices"));
    }
}
