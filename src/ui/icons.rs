pub struct Icons;

impl Icons {
    pub const BOOK: &str = "📒";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const NEW: &str = "✨";
    pub const MOD: &str = "📝";
    pub const DEL: &str = "🗑️";
    pub const ARCHIVE: &str = "🗃️";
    pub const DATABASE: &str = "🗄️";
    pub const PERSON: &str = "👤";
    pub const MONEY: &str = "💰";
    pub const PHOTO: &str = "🖼️";
    pub const LOCK: &str = "🔒";
}
