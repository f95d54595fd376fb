//! Response formatter - maps (tool name, raw upstream payload) to the text
//! block returned inside the MCP content envelope.
//!
//! Pure function over the payload; tolerant of missing fields (renders
//! `n/a`) so a partial upstream response still produces readable output.

use serde_json::Value;

pub fn format_response(tool: &str, payload: &Value) -> String {
    match tool {
        "get_credits" => format_credits(payload),
        "get_countries" => format_code_table(payload, "Supported countries"),
        "get_currencies" => format_code_table(payload, "Supported currencies"),
        "get_keyword_volume" | "get_related_keywords" | "get_pasf_keywords" => {
            format_keyword_rows(payload)
        }
        "get_domain_keywords" | "get_url_keywords" => format_ranking_keywords(payload),
        "get_domain_traffic" | "get_url_traffic" => format_traffic(payload),
        "get_domain_backlinks" | "get_url_backlinks" => format_backlinks(payload),
        "get_domain_referrers" | "get_url_referrers" => format_referrers(payload),
        // Unknown tool names never reach here (registry lookup happens
        // first); raw JSON is a safe fallback regardless.
        _ => payload.to_string(),
    }
}

fn format_credits(payload: &Value) -> String {
    let credits = payload
        .get("data")
        .and_then(first_number)
        .or_else(|| payload.get("credits").and_then(Value::as_u64));
    match credits {
        Some(n) => format!("Remaining API credits: {}", group_digits(n)),
        None => format!("Credits response: {}", payload),
    }
}

fn format_code_table(payload: &Value, heading: &str) -> String {
    let Some(map) = payload.get("data").and_then(Value::as_object) else {
        return format!("{}: {}", heading, payload);
    };
    let mut codes: Vec<_> = map.iter().collect();
    codes.sort_by_key(|(code, _)| code.as_str());
    let mut out = format!("{} ({}):\n", heading, codes.len());
    for (code, name) in codes {
        out.push_str(&format!("  {} - {}\n", code, name.as_str().unwrap_or("n/a")));
    }
    out
}

fn format_keyword_rows(payload: &Value) -> String {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        return format!("No keyword data returned: {}", payload);
    };
    if rows.is_empty() {
        return "No keyword data returned.".to_string();
    }
    let mut out = format!("Keyword data ({} results):\n", rows.len());
    for row in rows {
        let keyword = row.get("keyword").and_then(Value::as_str).unwrap_or("n/a");
        let volume = row
            .get("vol")
            .and_then(Value::as_u64)
            .map(group_digits)
            .unwrap_or_else(|| "n/a".to_string());
        let cpc = row
            .pointer("/cpc/value")
            .and_then(Value::as_str)
            .unwrap_or("n/a");
        let cpc_currency = row
            .pointer("/cpc/currency")
            .and_then(Value::as_str)
            .unwrap_or("");
        let competition = row
            .get("competition")
            .and_then(Value::as_f64)
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "  {} - volume: {}/mo, cpc: {}{}, competition: {}\n",
            keyword, volume, cpc_currency, cpc, competition
        ));
    }
    out
}

fn format_ranking_keywords(payload: &Value) -> String {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        return format!("No ranking keywords returned: {}", payload);
    };
    if rows.is_empty() {
        return "No ranking keywords found.".to_string();
    }
    let mut out = format!("Ranking keywords ({} results):\n", rows.len());
    for row in rows {
        let keyword = row.get("keyword").and_then(Value::as_str).unwrap_or("n/a");
        let position = row
            .get("position")
            .and_then(Value::as_u64)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let traffic = row
            .get("estimated_traffic")
            .and_then(Value::as_u64)
            .map(group_digits)
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "  #{} - {} (est. {} visits/mo)\n",
            position, keyword, traffic
        ));
    }
    out
}

fn format_traffic(payload: &Value) -> String {
    let data = payload.get("data").unwrap_or(payload);
    let monthly = data
        .get("estimated_monthly_traffic")
        .and_then(Value::as_u64)
        .map(group_digits)
        .unwrap_or_else(|| "n/a".to_string());
    let keywords = data
        .get("ranking_keywords")
        .and_then(Value::as_u64)
        .map(group_digits)
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Estimated monthly organic traffic: {} visits\nRanking keywords: {}",
        monthly, keywords
    )
}

fn format_backlinks(payload: &Value) -> String {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        return format!("No backlinks returned: {}", payload);
    };
    if rows.is_empty() {
        return "No backlinks found.".to_string();
    }
    let mut out = format!("Backlinks ({} results):\n", rows.len());
    for row in rows {
        let source = row.get("source_url").and_then(Value::as_str).unwrap_or("n/a");
        let anchor = row.get("anchor_text").and_then(Value::as_str).unwrap_or("");
        let first_seen = row.get("first_seen").and_then(Value::as_str).unwrap_or("n/a");
        if anchor.is_empty() {
            out.push_str(&format!("  {} (first seen {})\n", source, first_seen));
        } else {
            out.push_str(&format!(
                "  {} - \"{}\" (first seen {})\n",
                source, anchor, first_seen
            ));
        }
    }
    out
}

fn format_referrers(payload: &Value) -> String {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        return format!("No referring domains returned: {}", payload);
    };
    if rows.is_empty() {
        return "No referring domains found.".to_string();
    }
    let mut out = format!("Unique referring domains ({} results):\n", rows.len());
    for row in rows {
        let domain = row.get("domain").and_then(Value::as_str).unwrap_or("n/a");
        let backlinks = row
            .get("backlinks")
            .and_then(Value::as_u64)
            .map(group_digits)
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!("  {} - {} backlinks\n", domain, backlinks));
    }
    out
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// First numeric element of a JSON array, or the number itself.
fn first_number(v: &Value) -> Option<u64> {
    match v {
        Value::Number(_) => v.as_u64(),
        Value::Array(arr) => arr.first().and_then(Value::as_u64),
        _ => None,
    }
}

/// Thousands separators for counts: 1234567 → "1,234,567".
fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
