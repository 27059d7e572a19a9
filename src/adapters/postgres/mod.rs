pub mod circulation_store;

// パブリックに型を再エクスポート
pub use circulation_store::CirculationStore as PostgresCirculationStore;
