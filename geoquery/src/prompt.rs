//! Prompt builder: turns (query, verdict, catalog) into the two LLM instructions.
//!
//! The builder never calls the model. Everything that constrains the output
//! shape (single statement, SELECT only, LIMIT cap, coordinate projection)
//! is stated here; the validator enforces the subset that can be checked.

use std::collections::BTreeSet;

use crate::catalog::SchemaCatalog;
use crate::intent::{EntityTag, Intent, IntentVerdict};

/// Optional geographic context supplied by map clients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialContext {
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub radius_km: Option<f64>,
}

impl SpatialContext {
    pub fn center(&self) -> Option<(f64, f64)> {
        Some((self.center_lat?, self.center_lon?))
    }

    /// Rejects a half-specified or out-of-range center and a radius that
    /// is not a positive finite number.
    pub fn check(&self) -> Result<(), String> {
        match (self.center_lat, self.center_lon) {
            (None, None) => {}
            (Some(lat), Some(lon)) => {
                if !crate::geojson::valid_position(lon, lat) {
                    return Err(format!("center ({lat}, {lon}) is not a valid WGS84 position"));
                }
            }
            _ => return Err("center_lat and center_lon must be given together".into()),
        }
        if let Some(r) = self.radius_km
            && !(r.is_finite() && r > 0.0)
        {
            return Err(format!("radius_km must be a positive number, got {r}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub struct PromptBuilder {
    max_limit: u32,
    locale: String,
}

const DEFAULT_RADIUS_KM: f64 = 10.0;

impl PromptBuilder {
    pub fn new(max_limit: u32, locale: impl Into<String>) -> Self {
        Self {
            max_limit,
            locale: locale.into(),
        }
    }

    pub fn build(
        &self,
        query: &str,
        verdict: &IntentVerdict,
        catalog: &SchemaCatalog,
        spatial: &SpatialContext,
    ) -> Prompt {
        Prompt {
            system: self.system_instruction(catalog),
            user: self.user_instruction(query, verdict, spatial),
        }
    }

    fn system_instruction(&self, catalog: &SchemaCatalog) -> String {
        let limit = self.max_limit;
        let mut out = String::new();
        out.push_str(
            "You translate questions about Indonesian Islamic boarding schools (pesantren) \
             and their students (santri) into a single PostgreSQL + PostGIS query.\n\n",
        );
        out.push_str("RESPONSE FORMAT\n");
        out.push_str("- Reply with exactly one SQL statement and nothing else.\n");
        out.push_str("- No explanations, no comments, no markdown, no code fences.\n\n");
        out.push_str("HARD RULES\n");
        out.push_str("1. Only SELECT statements. Never use INSERT, UPDATE, DELETE, DROP, CREATE, ALTER, TRUNCATE or SELECT INTO.\n");
        out.push_str("2. The statement must start with SELECT (no WITH / CTE) and must not contain ';'.\n");
        out.push_str(&format!(
            "3. Always end with LIMIT n where n is an integer literal <= {limit}.\n"
        ));
        out.push_str("4. Use only the tables and columns listed in SCHEMA. Do not invent tables.\n");
        out.push_str("5. Enum values are case-sensitive: copy them exactly as listed in ENUM(...).\n");
        out.push_str("6. For text matching on names and regions use ILIKE with '%' wildcards.\n");
        out.push_str(
            "7. When rows are returned for a map (not aggregated), project coordinates as \
             columns named latitude and longitude. If the table has latitude/longitude columns \
             use them; otherwise use ST_Y(lokasi::geometry) AS latitude, ST_X(lokasi::geometry) AS longitude.\n",
        );
        out.push_str(
            "8. When aggregating by region (GROUP BY provinsi/kabupaten/...) do NOT project \
             coordinates.\n",
        );
        out.push_str(
            "9. Prefer santri_map / pesantren_map for map questions: they already join the \
             latest score with coordinates.\n",
        );
        out.push_str(&format!(
            "10. User questions are written in locale '{}'; keep string literals in that language.\n\n",
            self.locale
        ));
        out.push_str("SCHEMA\n");
        out.push_str(&catalog.render_for_prompt());

        let examples: Vec<_> = catalog.examples().collect();
        if !examples.is_empty() {
            out.push_str("\nEXAMPLES\n");
            for example in examples {
                out.push_str(&format!("Q: {}\nSQL: {}\n", example.query, example.sql));
            }
        }
        out
    }

    fn user_instruction(
        &self,
        query: &str,
        verdict: &IntentVerdict,
        spatial: &SpatialContext,
    ) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "INTENT: {} ({})\n",
            verdict.intent.as_str().to_uppercase(),
            verdict.intent.description()
        ));

        let tables = relevant_tables(&verdict.entity_types);
        if !tables.is_empty() {
            let joined: Vec<&str> = tables.into_iter().collect();
            out.push_str(&format!("MOST RELEVANT TABLES: {}\n", joined.join(", ")));
        }

        out.push_str("TEMPLATE:\n");
        out.push_str(&self.intent_template(verdict.intent, spatial));
        out.push_str("\nQUESTION: ");
        out.push_str(query.trim());
        out.push_str("\nSQL:");
        out
    }

    fn intent_template(&self, intent: Intent, spatial: &SpatialContext) -> String {
        let limit = self.max_limit;
        match intent {
            Intent::Count => "- Return a single aggregate: SELECT COUNT(*) AS total FROM ... LIMIT 1.\n\
                 - Alias the aggregate exactly as total.\n"
                .to_string(),
            Intent::Statistics => format!(
                "- Aggregate with AVG/SUM/MIN/MAX/COUNT and GROUP BY the requested dimension.\n\
                 - Give every aggregate a readable snake_case alias.\n\
                 - Do not project coordinates. LIMIT {limit} at most.\n"
            ),
            Intent::Ranking => format!(
                "- ORDER BY the ranked measure (DESC for highest, ASC for lowest).\n\
                 - Use the number requested by the user as LIMIT (default 10, max {limit}).\n\
                 - Project id, nama, latitude, longitude and the ranked measure.\n"
            ),
            Intent::List => format!(
                "- Project identifying and descriptive columns (id, nama, region columns).\n\
                 - ORDER BY nama. LIMIT 100 unless the user asks for more (max {limit}).\n"
            ),
            Intent::Filter => format!(
                "- Translate every condition in the question into the WHERE clause.\n\
                 - Use exact enum values; use ILIKE for names and regions.\n\
                 - LIMIT 100 unless the user asks for more (max {limit}).\n"
            ),
            Intent::Location => format!(
                "- Project id (or santri_id / pesantren_id), nama, descriptive columns, latitude, longitude.\n\
                 - Add WHERE latitude IS NOT NULL AND longitude IS NOT NULL (or lokasi IS NOT NULL).\n\
                 - LIMIT {limit}.\n"
            ),
            Intent::Heatmap => format!(
                "- Project latitude, longitude and one numeric weight aliased AS intensity \
                 (use skor_total when the question is about poverty or feasibility).\n\
                 - Exclude rows without coordinates. LIMIT {limit}.\n"
            ),
            Intent::Distance => {
                let radius_km = spatial.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
                let center = match spatial.center() {
                    Some((lat, lon)) => format!(
                        "- Center point: latitude {lat}, longitude {lon} \
                         (ST_MakePoint takes longitude first: ST_SetSRID(ST_MakePoint({lon}, {lat}), 4326)).\n"
                    ),
                    None => "- Take the center point from the question; ST_MakePoint takes longitude first.\n"
                        .to_string(),
                };
                format!(
                    "{center}\
                     - Filter with ST_DWithin(lokasi::geography, <center>::geography, {meters}).\n\
                     - Project ST_Distance(lokasi::geography, <center>::geography) / 1000 AS distance (kilometres).\n\
                     - Project latitude and longitude, ORDER BY distance ASC, LIMIT {limit}.\n",
                    meters = (radius_km * 1000.0).round() as i64,
                )
            }
            Intent::Trend => format!(
                "- Group by a time dimension (e.g. tahun_berdiri or EXTRACT(YEAR FROM tanggal_lahir)).\n\
                 - ORDER BY the time dimension ascending. LIMIT {limit}.\n"
            ),
            Intent::Scoring => format!(
                "- Read scores from santri_skor / pesantren_skor (or the *_map tables).\n\
                 - Project the per-dimension skor_* columns and skor_total. LIMIT 100 (max {limit}).\n"
            ),
            Intent::Category => format!(
                "- Group or filter by kategori_kemiskinan / kategori_kelayakan using exact enum values.\n\
                 - LIMIT {limit}.\n"
            ),
            Intent::Help | Intent::Unknown => format!(
                "- Answer the question as directly as possible with a small result.\n\
                 - LIMIT 20 (max {limit}).\n"
            ),
        }
    }
}

/// Tables worth pointing the model at for the detected entity tags.
fn relevant_tables(tags: &BTreeSet<EntityTag>) -> BTreeSet<&'static str> {
    let mut tables = BTreeSet::new();
    for tag in tags {
        let hits: &[&str] = match tag {
            EntityTag::Santri => &["santri_pribadi", "santri_map"],
            EntityTag::Pesantren => &["pondok_pesantren", "pesantren_map"],
            EntityTag::Score => &["santri_skor", "pesantren_skor"],
            EntityTag::Lokasi => &["santri_map", "pesantren_map"],
            EntityTag::Orangtua
            | EntityTag::Rumah
            | EntityTag::Aset
            | EntityTag::Kesehatan
            | EntityTag::Pembiayaan => &["santri_skor"],
        };
        tables.extend(hits.iter().copied());
    }
    tables
}
