pub use cia402::Parameter;
pub use datatypes::{DataType, Value};
pub use variable::Variable;

pub mod cia402;
pub mod datatypes;
pub mod variable;

use thiserror::Error;

/// Static map from symbolic parameter names to `(index, subindex, type)` of a remote device.
///
/// Nothing is discovered over the network, the table is supplied per drive model.
#[derive(Clone, Debug)]
pub struct ObjectDictionary {
    // sorted by (index, subindex)
    objects: Vec<Variable>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ODError {
    #[error("index 0x{0:04X} does not exist")]
    IndexDoesNotExist(u16),
    #[error("subindex 0x{0:04X}:{1} does not exist")]
    SubindexDoesNotExist(u16, u8),
    #[error("no object named {0:?}")]
    UnknownName(String),
}

impl ObjectDictionary {
    pub fn new(objects: impl IntoIterator<Item = Variable>) -> ObjectDictionary {
        let mut od = ObjectDictionary {
            objects: Vec::new(),
        };
        for variable in objects {
            od.insert(variable);
        }
        od
    }

    /// The standard CiA 402 layout for every [`Parameter`].
    pub fn cia402() -> ObjectDictionary {
        ObjectDictionary::new(Parameter::ALL.iter().map(|p| p.default_variable()))
    }

    /// Adds `variable`, replacing any entry with the same name or address.
    pub fn with(mut self, variable: Variable) -> Self {
        self.insert(variable);
        self
    }

    fn insert(&mut self, variable: Variable) {
        self.objects.retain(|obj| {
            obj.name != variable.name
                && (obj.index, obj.subindex) != (variable.index, variable.subindex)
        });
        let pos = self
            .objects
            .partition_point(|obj| (obj.index, obj.subindex) < (variable.index, variable.subindex));
        self.objects.insert(pos, variable);
    }

    pub fn get(&self, index: u16, subindex: u8) -> Result<&Variable, ODError> {
        match self
            .objects
            .binary_search_by(|obj| (obj.index, obj.subindex).cmp(&(index, subindex)))
        {
            Ok(pos) => Ok(&self.objects[pos]),
            Err(pos) => {
                // Binary search will return the index at which one could insert the searched for variable.
                // If an object with the same index exists, this position points into or just past it.
                if pos < self.objects.len() && self.objects[pos].index == index {
                    return Err(ODError::SubindexDoesNotExist(index, subindex));
                }
                if pos != 0 && self.objects[pos - 1].index == index {
                    return Err(ODError::SubindexDoesNotExist(index, subindex));
                }
                Err(ODError::IndexDoesNotExist(index))
            }
        }
    }

    pub fn by_name(&self, name: &str) -> Result<&Variable, ODError> {
        self.objects
            .iter()
            .find(|obj| obj.name == name)
            .ok_or_else(|| ODError::UnknownName(name.into()))
    }

    pub fn entry(&self, parameter: Parameter) -> Result<&Variable, ODError> {
        self.by_name(parameter.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.objects.iter()
    }
}

impl Default for ObjectDictionary {
    fn default() -> Self {
        Self::cia402()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup() {
        let od = ObjectDictionary::cia402();
        assert_eq!(od.get(0x6041, 0).unwrap().name, "status word");
        assert_eq!(
            od.get(0x607D, 3),
            Err(ODError::SubindexDoesNotExist(0x607D, 3))
        );
        assert_eq!(od.get(0x6042, 0), Err(ODError::IndexDoesNotExist(0x6042)));
        assert_eq!(
            od.entry(Parameter::SoftwarePositionLimitMax).unwrap().subindex,
            2
        );
        assert!(matches!(od.by_name("velocity"), Err(ODError::UnknownName(_))));
    }

    #[test]
    fn test_override_keeps_order() {
        let od = ObjectDictionary::cia402().with(Variable::new(
            "target current",
            0x6071,
            0x00,
            DataType::Int16,
        ));
        // the override displaced both the old current entry and target torque
        assert_eq!(od.entry(Parameter::TargetCurrent).unwrap().index, 0x6071);
        assert!(od.entry(Parameter::TargetTorque).is_err());
        assert!(od.get(0x2030, 0).is_err());
        assert!(od
            .iter()
            .zip(od.iter().skip(1))
            .all(|(a, b)| (a.index, a.subindex) < (b.index, b.subindex)));
    }
}
