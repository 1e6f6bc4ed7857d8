// Helper for generating UUIDv7 (timestamp-sortable UUIDs).
//
// Every primary key in the schema is generated app-side so rows created in
// one transaction can reference each other without a round trip.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
