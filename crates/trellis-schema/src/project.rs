//! Projection of an object's property fields into persistable values.
//!
//! This is the join point of the metadata provider and the converter
//! registry: every property field, in declared order, converted and ready
//! for fingerprinting or statement parameters.

use trellis_core::{DomainObject, MappingError, Value};

use crate::convert::ConverterRegistry;
use crate::registry::MetadataProvider;

/// Convert the object's property fields in declared order.
///
/// Returns `(persisted property name, converted value)` pairs. Unset fields
/// project as `Null` so a full-set update clears them in the store. Fails if
/// the object carries a property its schema does not declare, or if a value
/// is not persistable and has no registered converter.
pub fn persistable_properties(
    provider: &dyn MetadataProvider,
    converters: &ConverterRegistry,
    object: &DomainObject,
) -> Result<Vec<(String, Value)>, MappingError> {
    let type_key = object.type_key();
    let entity = provider.class_name(type_key)?.to_string();
    let fields = provider.property_fields(type_key)?;

    for name in object.property_names() {
        if !fields.iter().any(|d| d.field == name) {
            return Err(MappingError::UnclassifiedField {
                entity,
                field: name.to_string(),
            });
        }
    }

    let mut projected = Vec::with_capacity(fields.len());
    for descriptor in fields {
        let raw = provider
            .field_value(descriptor, object)
            .cloned()
            .unwrap_or(Value::Null);

        let converted = match converters.converter_for(type_key, &descriptor.field) {
            Some(converter) => {
                converter
                    .to_persisted(&raw)
                    .map_err(|source| MappingError::Conversion {
                        entity: entity.clone(),
                        field: descriptor.field.clone(),
                        source,
                    })?
            }
            None => raw,
        };

        if !converted.is_persistable() {
            return Err(MappingError::Conversion {
                entity: entity.clone(),
                field: descriptor.field.clone(),
                source: anyhow::anyhow!(
                    "value {converted:?} is not a persistable scalar and no converter is registered"
                ),
            });
        }

        projected.push((descriptor.property.clone(), converted));
    }

    Ok(projected)
}
