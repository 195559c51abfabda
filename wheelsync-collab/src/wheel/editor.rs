use log::debug;
use wheelsync_core::{DocumentStore, Update, Value};

use crate::{CollabContext, CollabError, Connection, Result, WheelData, WheelItem};

const ITEMS_FIELD: &str = "wheelItems";

/// Edits the options of one wheel.
///
/// Options are matched by value, never by index, so concurrent edits by
/// other players can't shift what an edit applies to.
pub struct WheelEditor<Db> {
    context: CollabContext<Db>,
    connection: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The new option is identical to the old one, nothing was written
    Unchanged,
    Replaced,
}

impl<Db> WheelEditor<Db>
where
    Db: DocumentStore,
{
    pub fn new(context: &CollabContext<Db>, connection: Connection) -> Self {
        Self {
            context: context.clone(),
            connection,
        }
    }

    /// Adds an option, unless an identical one is already on the wheel
    pub async fn add(&self, item: WheelItem) -> Result<()> {
        validate(&item)?;

        let update = Update::new().array_union(ITEMS_FIELD, vec![item.to_value()]);
        self.write(update).await?;

        debug!("Added {} to wheel of room {}", item.option_name, self.connection.room_id);
        Ok(())
    }

    /// Replaces an option by removing the old one and adding the new one
    pub async fn edit(&self, old: &WheelItem, new: WheelItem) -> Result<EditOutcome> {
        if *old == new {
            return Ok(EditOutcome::Unchanged);
        }

        validate(&new)?;

        let stored = self.stored_records(old).await?;
        self.write(Update::new().array_remove(ITEMS_FIELD, stored))
            .await?;
        self.write(Update::new().array_union(ITEMS_FIELD, vec![new.to_value()]))
            .await?;

        debug!(
            "Replaced {} with {} on wheel of room {}",
            old.option_name, new.option_name, self.connection.room_id
        );

        Ok(EditOutcome::Replaced)
    }

    /// Removes every option equal to `item`
    pub async fn delete(&self, item: &WheelItem) -> Result<()> {
        let stored = self.stored_records(item).await?;
        self.write(Update::new().array_remove(ITEMS_FIELD, stored))
            .await?;

        debug!("Removed {} from wheel of room {}", item.option_name, self.connection.room_id);
        Ok(())
    }

    /// Every record on the wheel that reads as `item`, plus its own encoding.
    /// Records written by other clients may differ in key order, number type
    /// or hex case, and still need to match.
    async fn stored_records(&self, item: &WheelItem) -> Result<Vec<Value>> {
        let snapshot = self.context.store.get(&self.connection.wheel_path()?).await?;
        let mut records = vec![item.to_value()];

        if let Some(wheel) = WheelData::from_snapshot(&snapshot)? {
            for record in wheel.items.iter().filter(|i| *i == item).map(WheelItem::to_value) {
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    async fn write(&self, update: Update) -> Result<()> {
        let path = self.connection.wheel_path()?;
        self.context.store.update(&path, update).await?;

        Ok(())
    }
}

fn validate(item: &WheelItem) -> Result<()> {
    if item.option_name.is_empty() {
        return Err(CollabError::InvalidInput("option name is empty"));
    }

    Ok(())
}
