//! 演示数据：空库时写入一批 KOL，便于本地跑通完整流程

use rusqlite::Connection;

use super::kols;
use super::models::Kol;

/// (id, name, handle, platform, country, category, followers, engagement_rate, bio)
const DEMO_KOLS: &[(&str, &str, &str, &str, &str, &str, i64, f64, &str)] = &[
    ("kol-001", "Kim Min-ji", "@minji.glow", "instagram", "South Korea", "beauty", 850_000, 4.2, "K-beauty skincare routines and honest product reviews"),
    ("kol-002", "Park Ji-hoon", "@jihoon.eats", "youtube", "South Korea", "food", 1_200_000, 3.1, "Seoul street food tours and home cooking"),
    ("kol-003", "Lee Seo-yeon", "@seoyeon.fit", "tiktok", "South Korea", "fitness", 430_000, 6.8, "Short pilates and stretching routines"),
    ("kol-004", "Choi Da-eun", "@daeun.daily", "instagram", "South Korea", "lifestyle", 95_000, 5.5, "Minimal lifestyle, cafes and skincare hauls"),
    ("kol-005", "Nguyen Thu Trang", "@trang.travels", "instagram", "Vietnam", "travel", 310_000, 4.9, "Budget travel across Southeast Asia"),
    ("kol-006", "Tanaka Yui", "@yui.makeup", "youtube", "Japan", "beauty", 2_100_000, 2.7, "Makeup tutorials and J-beauty trends"),
    ("kol-007", "Siti Rahma", "@siti.modest", "tiktok", "Indonesia", "fashion", 780_000, 7.3, "Modest fashion styling and outfit ideas"),
    ("kol-008", "Chen Wei", "@weitech", "youtube", "Taiwan", "tech", 560_000, 3.6, "Gadget unboxings and smartphone camera tests"),
    ("kol-009", "Maria Santos", "@maria.bakes", "instagram", "Philippines", "food", 120_000, 8.1, "Home baking and Filipino desserts"),
    ("kol-010", "Jung Ha-neul", "@haneul.games", "twitch", "South Korea", "gaming", 670_000, 5.0, "Competitive FPS streams and esports commentary"),
];

/// 写入演示 KOL（已存在的 id 跳过）
pub fn seed_demo_kols(conn: &Connection) -> rusqlite::Result<()> {
    for &(id, name, handle, platform, country, category, followers, engagement_rate, bio) in DEMO_KOLS {
        if kols::get(conn, id)?.is_some() {
            continue;
        }
        kols::insert(
            conn,
            &Kol {
                id: id.to_string(),
                name: name.to_string(),
                handle: handle.to_string(),
                platform: platform.to_string(),
                country: country.to_string(),
                category: category.to_string(),
                followers,
                engagement_rate,
                bio: bio.to_string(),
            },
        )?;
    }
    Ok(())
}
