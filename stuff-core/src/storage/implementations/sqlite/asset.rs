//! SQLite implementation of AssetStore
//!
//! Parts and purchases live in their own tables and are rewritten on every
//! update. Searchable columns are mirrored into an FTS5 table kept in sync
//! by triggers.

use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params, params_from_iter};

use super::SqliteStore;
use crate::error::{Error, OptionalRow, Result};
use crate::storage::helper::{limit_offset, now, rarray};
use crate::storage::ids::AssetId;
use crate::storage::traits::{AssetStore, FileStore};
use crate::storage::types::asset::{
    Asset, AssetKey, CustomAttr, GetAssetQuery, ListAssetsQuery, MonetaryAmount, OrderDir, Part,
    Purchase, StoredAsset,
};
use crate::storage::types::file::ListFilesQuery;
use crate::storage::types::list::ListPage;
use crate::storage::types::stored::{Editable, Stored};

pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL DEFAULT 'ASSET',
            parent_asset_id INTEGER REFERENCES assets(id) ON DELETE SET NULL,
            status TEXT NOT NULL DEFAULT 'IN_STORAGE',
            tag TEXT NOT NULL UNIQUE CHECK (tag <> ''),
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            model TEXT NOT NULL DEFAULT '',
            model_no TEXT NOT NULL DEFAULT '',
            serial_no TEXT NOT NULL DEFAULT '',
            manufacturer TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            image_url TEXT,
            thumbnail_url TEXT,
            warranty_until TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            quantity_unit TEXT NOT NULL DEFAULT '',
            custom_attrs TEXT NOT NULL DEFAULT '[]',
            checked_out_to INTEGER,
            location TEXT NOT NULL DEFAULT '',
            position_code TEXT NOT NULL DEFAULT '',
            parts_total_counter INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assets_parent ON assets(parent_asset_id);

        CREATE TABLE IF NOT EXISTS asset_parts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            name TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            position_code TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            created_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_asset_parts_asset ON asset_parts(asset_id);

        CREATE TABLE IF NOT EXISTS asset_purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
            supplier TEXT NOT NULL DEFAULT '',
            order_no TEXT NOT NULL DEFAULT '',
            order_date TEXT,
            amount INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT '',
            created_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_asset_purchases_asset ON asset_purchases(asset_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS assets_fts USING fts5(
            tag, name, category, model, manufacturer, notes, location,
            content='assets', content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS assets_fts_insert AFTER INSERT ON assets BEGIN
            INSERT INTO assets_fts(rowid, tag, name, category, model, manufacturer, notes, location)
            VALUES (new.id, new.tag, new.name, new.category, new.model, new.manufacturer, new.notes, new.location);
        END;

        CREATE TRIGGER IF NOT EXISTS assets_fts_delete AFTER DELETE ON assets BEGIN
            INSERT INTO assets_fts(assets_fts, rowid, tag, name, category, model, manufacturer, notes, location)
            VALUES ('delete', old.id, old.tag, old.name, old.category, old.model, old.manufacturer, old.notes, old.location);
        END;

        CREATE TRIGGER IF NOT EXISTS assets_fts_update AFTER UPDATE ON assets BEGIN
            INSERT INTO assets_fts(assets_fts, rowid, tag, name, category, model, manufacturer, notes, location)
            VALUES ('delete', old.id, old.tag, old.name, old.category, old.model, old.manufacturer, old.notes, old.location);
            INSERT INTO assets_fts(rowid, tag, name, category, model, manufacturer, notes, location)
            VALUES (new.id, new.tag, new.name, new.category, new.model, new.manufacturer, new.notes, new.location);
        END;
        "#,
    )?;
    Ok(())
}

const ASSET_COLUMNS: &str = "a.id, a.type, a.parent_asset_id, a.status, a.tag, a.name, a.category, \
    a.model, a.model_no, a.serial_no, a.manufacturer, a.notes, a.image_url, a.thumbnail_url, \
    a.warranty_until, a.quantity, a.quantity_unit, a.custom_attrs, a.checked_out_to, a.location, \
    a.position_code, a.parts_total_counter, a.created_by, a.created_at, a.updated_at";

/// Columns of the full-text index, usable in field-scoped search.
const SEARCH_COLUMNS: &[&str] = &[
    "tag",
    "name",
    "category",
    "model",
    "manufacturer",
    "notes",
    "location",
];

const ORDER_COLUMNS: &[&str] = &[
    "id",
    "tag",
    "name",
    "category",
    "status",
    "location",
    "created_at",
    "updated_at",
];

fn map_asset(row: &Row<'_>) -> rusqlite::Result<StoredAsset> {
    let custom_attrs: String = row.get(17)?;
    let custom_attrs: Vec<CustomAttr> = serde_json::from_str(&custom_attrs).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(17, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let asset = Asset {
        asset_type: row.get(1)?,
        parent_asset_id: row.get(2)?,
        status: row.get(3)?,
        tag: row.get(4)?,
        name: row.get(5)?,
        category: row.get(6)?,
        model: row.get(7)?,
        model_no: row.get(8)?,
        serial_no: row.get(9)?,
        manufacturer: row.get(10)?,
        notes: row.get(11)?,
        image_url: row.get(12)?,
        thumbnail_url: row.get(13)?,
        warranty_until: row.get(14)?,
        quantity: row.get(15)?,
        quantity_unit: row.get(16)?,
        custom_attrs,
        checked_out_to: row.get(18)?,
        location: row.get(19)?,
        position_code: row.get(20)?,
        parts_total_counter: row.get(21)?,
        created_by: row.get(22)?,
        ..Default::default()
    };

    Ok(Stored::new(row.get(0)?, Editable::new(asset, row.get(24)?), row.get(23)?))
}

fn load_parts(exec: &Connection, id: AssetId) -> Result<Vec<Part>> {
    let mut stmt = exec.prepare(
        "SELECT tag, name, location, position_code, notes, created_by
         FROM asset_parts WHERE asset_id = ?1 ORDER BY id ASC",
    )?;
    let parts = stmt
        .query_map([id], |row| {
            Ok(Part {
                tag: row.get(0)?,
                name: row.get(1)?,
                location: row.get(2)?,
                position_code: row.get(3)?,
                notes: row.get(4)?,
                created_by: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(parts)
}

fn load_purchases(exec: &Connection, id: AssetId) -> Result<Vec<Purchase>> {
    let mut stmt = exec.prepare(
        "SELECT supplier, order_no, order_date, amount, currency, created_by
         FROM asset_purchases WHERE asset_id = ?1 ORDER BY id ASC",
    )?;
    let purchases = stmt
        .query_map([id], |row| {
            Ok(Purchase {
                supplier: row.get(0)?,
                order_no: row.get(1)?,
                order_date: row.get(2)?,
                amount: MonetaryAmount(row.get(3)?),
                currency: row.get(4)?,
                created_by: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(purchases)
}

/// Replace the parts and purchases of `id` with the ones on `asset`.
fn write_children(exec: &Connection, id: AssetId, asset: &Asset) -> Result<()> {
    let now = now();
    exec.execute("DELETE FROM asset_parts WHERE asset_id = ?1", [id])?;
    exec.execute("DELETE FROM asset_purchases WHERE asset_id = ?1", [id])?;

    let mut insert_part = exec.prepare(
        "INSERT INTO asset_parts
            (asset_id, tag, name, location, position_code, notes, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )?;
    for part in &asset.parts {
        insert_part.execute(params![
            id,
            part.tag,
            part.name,
            part.location,
            part.position_code,
            part.notes,
            part.created_by.or(asset.created_by),
            now,
        ])?;
    }

    let mut insert_purchase = exec.prepare(
        "INSERT INTO asset_purchases
            (asset_id, supplier, order_no, order_date, amount, currency, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )?;
    for purchase in &asset.purchases {
        insert_purchase.execute(params![
            id,
            purchase.supplier,
            purchase.order_no,
            purchase.order_date,
            purchase.amount.0,
            purchase.currency,
            purchase.created_by.or(asset.created_by),
            now,
        ])?;
    }
    Ok(())
}

/// Split free text into FTS5 string literals, dropping everything except
/// word characters, `*` and spaces.
fn fts_terms(raw: &str) -> Vec<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '*' || *c == ' ')
        .collect();
    cleaned
        .split_whitespace()
        .map(|t| t.trim_matches('*'))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect()
}

/// Prefix query over the terms, optionally scoped to one column:
/// `"desk" "lam"*` or `location : "desk" location : "lam"*`.
pub(crate) fn fts_query(raw: &str, column: Option<&str>) -> Option<String> {
    let terms = fts_terms(raw);
    if terms.is_empty() {
        return None;
    }
    let scoped: Vec<String> = terms
        .into_iter()
        .map(|t| match column {
            Some(col) => format!("{col} : {t}"),
            None => t,
        })
        .collect();
    Some(format!("{}*", scoped.join(" ")))
}

fn match_expression(query: &ListAssetsQuery) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(search) = query.search.as_deref().and_then(|s| fts_query(s, None)) {
        parts.push(search);
    }
    for (field, value) in &query.fields {
        if !SEARCH_COLUMNS.contains(&field.as_str()) {
            continue;
        }
        if let Some(term) = fts_query(value, Some(field)) {
            parts.push(term);
        }
    }
    (!parts.is_empty()).then(|| parts.join(" AND "))
}

impl AssetStore for SqliteStore {
    fn get(&self, exec: &Connection, query: &GetAssetQuery) -> Result<StoredAsset> {
        let mut asset = match &query.key {
            AssetKey::Id(id) => exec.query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.id = ?1"),
                [id],
                map_asset,
            ),
            AssetKey::Tag(tag) => exec.query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.tag = ?1"),
                [tag],
                map_asset,
            ),
        }
        .or_not_found(Error::AssetNotFound)?;

        let id = asset.id;
        if query.with_parts {
            asset.parts = load_parts(exec, id)?;
        }
        if query.with_purchases {
            asset.purchases = load_purchases(exec, id)?;
        }
        if query.with_files {
            asset.files = FileStore::list(self, exec, &ListFilesQuery::for_asset(id))?.items;
        }
        if query.with_children {
            let mut stmt = exec.prepare(&format!(
                "SELECT {ASSET_COLUMNS} FROM assets a WHERE a.parent_asset_id = ?1 ORDER BY a.id ASC"
            ))?;
            asset.children = stmt
                .query_map([id], map_asset)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        if query.with_parent {
            if let Some(parent_id) = asset.parent_asset_id {
                match AssetStore::get(self, exec, &GetAssetQuery::by_id(parent_id)) {
                    Ok(parent) => asset.parent = Some(Box::new(parent)),
                    Err(Error::AssetNotFound) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(asset)
    }

    fn list(&self, exec: &Connection, query: &ListAssetsQuery) -> Result<ListPage<StoredAsset>> {
        let from = "FROM assets a";
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(expr) = match_expression(query) {
            args.push(Box::new(expr));
            conditions.push(format!(
                "a.id IN (SELECT rowid FROM assets_fts WHERE assets_fts MATCH ?{})",
                args.len()
            ));
        }
        if !query.ids.is_empty() {
            args.push(Box::new(rarray(query.ids.iter().map(|id| id.get()))));
            conditions.push(format!("a.id IN rarray(?{})", args.len()));
        }
        if let Some(asset_type) = query.asset_type {
            args.push(Box::new(asset_type));
            conditions.push(format!("a.type = ?{}", args.len()));
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let total: u64 = exec.query_row(
            &format!("SELECT COUNT(*) {from}{filter}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let order_by = query
            .order_by
            .as_deref()
            .filter(|col| ORDER_COLUMNS.contains(col))
            .unwrap_or("id");
        let order_dir = match query.order_dir {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        };

        let page_size = query.effective_page_size();
        let (limit, offset) = limit_offset(query.page, page_size);
        args.push(Box::new(limit));
        args.push(Box::new(offset));

        let sql = format!(
            "SELECT {ASSET_COLUMNS} {from}{filter} ORDER BY a.{order_by} {order_dir}, a.id ASC LIMIT ?{} OFFSET ?{}",
            args.len() - 1,
            args.len(),
        );
        let mut stmt = exec.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), map_asset)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ListPage::new(items, total, query.page, page_size))
    }

    fn create(&self, exec: &Connection, asset: &Asset) -> Result<AssetId> {
        let now = now();
        let custom_attrs = serde_json::to_string(&asset.custom_attrs)?;
        exec.execute(
            "INSERT INTO assets (
                type, parent_asset_id, status, tag, name, category, model, model_no, serial_no,
                manufacturer, notes, image_url, thumbnail_url, warranty_until, quantity,
                quantity_unit, custom_attrs, checked_out_to, location, position_code,
                parts_total_counter, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?23)",
            params![
                asset.asset_type,
                asset.parent_asset_id,
                asset.status,
                asset.tag,
                asset.name,
                asset.category,
                asset.model,
                asset.model_no,
                asset.serial_no,
                asset.manufacturer,
                asset.notes,
                asset.image_url,
                asset.thumbnail_url,
                asset.warranty_until,
                asset.quantity,
                asset.quantity_unit,
                custom_attrs,
                asset.checked_out_to,
                asset.location,
                asset.position_code,
                asset.parts_total_counter,
                asset.created_by,
                now,
            ],
        )?;
        let id = AssetId::new(exec.last_insert_rowid());
        write_children(exec, id, asset)?;
        Ok(id)
    }

    fn update(&self, exec: &Connection, id: AssetId, asset: &Asset) -> Result<()> {
        let custom_attrs = serde_json::to_string(&asset.custom_attrs)?;
        let changed = exec.execute(
            "UPDATE assets SET
                type = ?2, parent_asset_id = ?3, status = ?4, tag = ?5, name = ?6, category = ?7,
                model = ?8, model_no = ?9, serial_no = ?10, manufacturer = ?11, notes = ?12,
                image_url = ?13, thumbnail_url = ?14, warranty_until = ?15, quantity = ?16,
                quantity_unit = ?17, custom_attrs = ?18, checked_out_to = ?19, location = ?20,
                position_code = ?21, parts_total_counter = ?22, updated_at = ?23
             WHERE id = ?1",
            params![
                id,
                asset.asset_type,
                asset.parent_asset_id,
                asset.status,
                asset.tag,
                asset.name,
                asset.category,
                asset.model,
                asset.model_no,
                asset.serial_no,
                asset.manufacturer,
                asset.notes,
                asset.image_url,
                asset.thumbnail_url,
                asset.warranty_until,
                asset.quantity,
                asset.quantity_unit,
                custom_attrs,
                asset.checked_out_to,
                asset.location,
                asset.position_code,
                asset.parts_total_counter,
                now(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::AssetNotFound);
        }
        write_children(exec, id, asset)
    }

    fn delete(&self, exec: &Connection, id: AssetId) -> Result<()> {
        let changed = exec.execute("DELETE FROM assets WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::AssetNotFound);
        }
        Ok(())
    }
}
