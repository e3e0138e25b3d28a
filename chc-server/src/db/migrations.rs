//! Schema setup
//!
//! Every statement is `IF NOT EXISTS`, so running on each start is safe.

use sqlx::PgPool;

/// Audit columns shared by the desk-facing tables
macro_rules! audit_columns {
    () => {
        r#"
            created_by TEXT,
            created_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            lastmodified_by TEXT,
            lastmodified_date TIMESTAMPTZ
        "#
    };
}

const USERS: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(500) NOT NULL,
        role VARCHAR(500) NOT NULL,
        password_hash TEXT NOT NULL,
        UNIQUE (name, role),
    "#,
    audit_columns!(),
    ")"
);

const EMPLOYEES: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS employees (
        id BIGSERIAL PRIMARY KEY,
        company_id VARCHAR(20) NOT NULL DEFAULT 'CHC001',
        employee_name VARCHAR(100) NOT NULL,
        employee_id VARCHAR(20) NOT NULL,
        gender VARCHAR(10) NOT NULL,
        age INTEGER NOT NULL CHECK (age BETWEEN 0 AND 150),
        company_name VARCHAR(200),
        department VARCHAR(200),
        email VARCHAR(200),
        mobile VARCHAR(200),
    "#,
    audit_columns!(),
    ")"
);

const BILLINGS: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS billings (
        id BIGSERIAL PRIMARY KEY,
        company_id VARCHAR(20) NOT NULL DEFAULT 'CHC001',
        date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        employee_id VARCHAR(50) NOT NULL,
        barcode VARCHAR(50) NOT NULL,
        testdetails JSONB NOT NULL DEFAULT '[]',
        net_amount NUMERIC(10, 2) NOT NULL DEFAULT 0,
        payment_mode VARCHAR(50) NOT NULL DEFAULT 'Credit',
    "#,
    audit_columns!(),
    ")"
);

const PACKAGES: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS packages (
        id BIGSERIAL PRIMARY KEY,
        package_name VARCHAR(100),
        investigations JSONB NOT NULL DEFAULT '[]',
        total_amount NUMERIC(10, 2) NOT NULL,
    "#,
    audit_columns!(),
    ")"
);

const SAMPLES: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS samples (
        id BIGSERIAL PRIMARY KEY,
        company_id VARCHAR(20) NOT NULL DEFAULT 'CHC001',
        barcode VARCHAR(50) NOT NULL,
        employee_id VARCHAR(50),
        collected_on DATE NOT NULL,
        testdetails JSONB NOT NULL DEFAULT '[]',
        UNIQUE (barcode, company_id, collected_on),
    "#,
    audit_columns!(),
    ")"
);

const BATCHES: &str = concat!(
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id BIGSERIAL PRIMARY KEY,
        company_id VARCHAR(20) NOT NULL DEFAULT 'CHC001',
        batch_number VARCHAR(20) NOT NULL UNIQUE,
        batch_date DATE NOT NULL,
        batch_details JSONB NOT NULL DEFAULT '[]',
        specimen_count JSONB NOT NULL DEFAULT '[]',
        received BOOLEAN NOT NULL DEFAULT FALSE,
        received_by TEXT,
        received_date TIMESTAMPTZ,
        remarks TEXT,
    "#,
    audit_columns!(),
    ")"
);

const INVESTIGATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS investigations (
        barcode VARCHAR(50) PRIMARY KEY,
        employee_id VARCHAR(50) NOT NULL,
        company_id VARCHAR(20) NOT NULL DEFAULT 'CHC001',
        vitals JSONB NOT NULL DEFAULT '{}',
        gender VARCHAR(10) NOT NULL,
        age INTEGER NOT NULL,
        date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        patient_history VARCHAR(1200),
        ecg_notes VARCHAR(500),
        pft_notes VARCHAR(500),
        audiometry_notes VARCHAR(500),
        xray_file UUID,
        xrayfilm_file UUID,
        ecg_file UUID,
        pft_file UUID,
        audiometric_file UUID
    )
"#;

const OPHTHALMOLOGY: &str = r#"
    CREATE TABLE IF NOT EXISTS ophthalmology (
        barcode VARCHAR(50) PRIMARY KEY,
        visual_acuity JSONB NOT NULL DEFAULT '{}',
        remarks TEXT,
        patient_complaints VARCHAR(505),
        status VARCHAR(20) NOT NULL DEFAULT 'pending',
        date TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const DOCUMENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY,
        collection TEXT NOT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const BLOBS: &str = r#"
    CREATE TABLE IF NOT EXISTS blobs (
        id UUID PRIMARY KEY,
        filename TEXT,
        content_type TEXT,
        length BIGINT NOT NULL,
        data BYTEA NOT NULL,
        uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_employees_employee_id ON employees (employee_id)",
    "CREATE INDEX IF NOT EXISTS idx_billings_company_date ON billings (company_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_billings_barcode ON billings (barcode)",
    "CREATE INDEX IF NOT EXISTS idx_samples_lastmodified ON samples (lastmodified_date)",
    "CREATE INDEX IF NOT EXISTS idx_samples_testdetails ON samples USING GIN (testdetails jsonb_path_ops)",
    "CREATE INDEX IF NOT EXISTS idx_batches_date ON batches (batch_date)",
    "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection)",
];

/// Create all tables and indexes.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running migrations...");

    let tables = [
        ("users", USERS),
        ("employees", EMPLOYEES),
        ("billings", BILLINGS),
        ("packages", PACKAGES),
        ("samples", SAMPLES),
        ("batches", BATCHES),
        ("investigations", INVESTIGATIONS),
        ("ophthalmology", OPHTHALMOLOGY),
        ("documents", DOCUMENTS),
        ("blobs", BLOBS),
    ];
    for (name, ddl) in tables {
        tracing::debug!(table = name, "ensuring table");
        sqlx::query(ddl).execute(pool).await?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audited_tables_carry_audit_columns() {
        for ddl in [USERS, EMPLOYEES, BILLINGS, PACKAGES, SAMPLES, BATCHES] {
            assert!(ddl.contains("lastmodified_date TIMESTAMPTZ"));
            assert!(ddl.trim_end().ends_with(')'));
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn migrations_are_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool creation failed");
        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");
    }
}
