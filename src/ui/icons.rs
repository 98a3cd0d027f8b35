pub struct Icons;

impl Icons {
    pub const BOOK: &str = "📖";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const PERSON: &str = "👤";
    pub const PAGE: &str = "📄";
    pub const FIELD: &str = "🏷️";
    pub const VALUE: &str = "🔹";
    pub const SCHEMA: &str = "📐";
    pub const LINK: &str = "🔗";
}
