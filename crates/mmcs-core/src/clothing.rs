// SPDX-FileCopyrightText: 2026 MMCS Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The clothing keyword filter (filter stage 3).
//!
//! Applied to `lowercase(name + " " + labels)` of every item returned by a
//! search. Exclusion tokens reject first; after that, at least one inclusion
//! token is required. The include-required policy deliberately trades false
//! negatives on genuine clothing for zero non-clothing notifications.

use crate::types::Item;

/// Tokens that mark an item as definitely not clothing.
///
/// Covers electronics, gaming, media, collectibles, furniture, vehicles,
/// food, cosmetics, pets, tools, and plants, in Japanese and English.
pub const EXCLUSION_TOKENS: &[&str] = &[
    // electronics
    "nintendo",
    "playstation",
    "xbox",
    "console",
    "controller",
    "laptop",
    "computer",
    "keyboard",
    "monitor",
    "headphone",
    "earphone",
    "speaker",
    "camera",
    "iphone",
    "smartphone",
    "tablet",
    "charger",
    "battery",
    "テレビ",
    "パソコン",
    "スマホ",
    "イヤホン",
    "ヘッドホン",
    "スピーカー",
    "カメラ",
    "充電器",
    "ゲーム機",
    "コントローラー",
    // gaming and media
    "video game",
    "game boy",
    "ゲームソフト",
    "dvd",
    "blu-ray",
    "vinyl record",
    "レコード",
    "漫画",
    "manga",
    // collectibles and toys
    "figure",
    "figurine",
    "フィギュア",
    "trading card",
    "トレカ",
    "ポケモンカード",
    "plush",
    "ぬいぐるみ",
    "gundam",
    "ガンプラ",
    // furniture
    "sofa",
    "table",
    "desk",
    "chair",
    "shelf",
    "lamp",
    "ソファ",
    "テーブル",
    "デスク",
    "椅子",
    "棚",
    "ランプ",
    "家具",
    // vehicles
    "motorcycle",
    "engine",
    "tire",
    "バイク",
    "エンジン",
    "タイヤ",
    "車用",
    // food
    "snack",
    "coffee bean",
    "お菓子",
    "食品",
    "飲料",
    // cosmetics
    "perfume",
    "shampoo",
    "skincare",
    "化粧品",
    "香水",
    "シャンプー",
    "コスメ",
    // pets
    "pet food",
    "ペット",
    "犬用",
    "猫用",
    // tools
    "power tool",
    "drill",
    "工具",
    "電動ドリル",
    // plants
    "houseplant",
    "観葉植物",
    "植木",
    "盆栽",
];

/// Tokens at least one of which must appear for an item to count as clothing.
///
/// Covers tops, bottoms, dresses, outerwear, shoes, bags, accessories,
/// underwear, swimwear, and socks, in Japanese and English.
pub const INCLUSION_TOKENS: &[&str] = &[
    // tops
    "shirt",
    "t-shirt",
    "tee",
    "blouse",
    "sweater",
    "sweatshirt",
    "knit",
    "hoodie",
    "cardigan",
    "vest",
    "polo",
    "tシャツ",
    "シャツ",
    "ブラウス",
    "セーター",
    "ニット",
    "パーカー",
    "カーディガン",
    "トップス",
    "ベスト",
    // bottoms
    "pants",
    "jeans",
    "denim",
    "trousers",
    "skirt",
    "shorts",
    "slacks",
    "パンツ",
    "ジーンズ",
    "デニム",
    "スカート",
    "ズボン",
    "ボトムス",
    "スラックス",
    // dresses
    "dress",
    "gown",
    "one-piece",
    "ワンピース",
    "ドレス",
    // outerwear
    "jacket",
    "coat",
    "blazer",
    "parka",
    "anorak",
    "ジャケット",
    "コート",
    "ブルゾン",
    "アウター",
    "ダウン",
    // shoes
    "sneaker",
    "boots",
    "loafer",
    "sandal",
    "heels",
    "shoes",
    "スニーカー",
    "ブーツ",
    "ローファー",
    "サンダル",
    "シューズ",
    "靴",
    "パンプス",
    // bags
    "backpack",
    "tote",
    "handbag",
    "pouch",
    "bag",
    "バッグ",
    "リュック",
    "トート",
    "ポーチ",
    "鞄",
    // accessories
    "necklace",
    "bracelet",
    "earring",
    "belt",
    "scarf",
    "beanie",
    "gloves",
    "wallet",
    "hat",
    "cap",
    "ネックレス",
    "ブレスレット",
    "ピアス",
    "指輪",
    "ベルト",
    "マフラー",
    "スカーフ",
    "帽子",
    "キャップ",
    "手袋",
    "アクセサリー",
    "財布",
    // underwear
    "underwear",
    "lingerie",
    "bra",
    "下着",
    "ブラ",
    "インナー",
    // swimwear
    "swimsuit",
    "bikini",
    "水着",
    "ビキニ",
    // socks
    "socks",
    "tights",
    "stockings",
    "靴下",
    "ソックス",
    "タイツ",
    "ストッキング",
];

/// Decides whether an item passes the clothing filter.
pub fn is_clothing(item: &Item) -> bool {
    let mut haystack = item.name.to_lowercase();
    for label in &item.labels {
        haystack.push(' ');
        haystack.push_str(&label.to_lowercase());
    }

    if EXCLUSION_TOKENS.iter().any(|t| haystack.contains(t)) {
        return false;
    }
    INCLUSION_TOKENS.iter().any(|t| haystack.contains(t))
}

/// Retains only the items that pass [`is_clothing`].
pub fn filter_clothing(items: Vec<Item>) -> Vec<Item> {
    items.into_iter().filter(is_clothing).collect()
}
