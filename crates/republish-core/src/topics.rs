// Topic names derived from the output root and the host id.

use crate::config::TopicLayout;
use crate::model::Resolution;

const SENSOR_CONFIG: &str = "sensors/config/local_sensors";

/// Every topic the service publishes to or listens on besides raw telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// `<root>/sensors/config/local_sensors/update`
    pub update: String,
    /// `<root>/sensors/config/local_sensors/current` (read at startup only)
    pub global_current: String,
    /// `<root>/<source>/sensors/config/local_sensors/current`
    pub host_current: String,
    /// `<root>/<source>/sensors`
    pub data_namespace: String,
    layout: TopicLayout,
}

impl Topics {
    pub fn new(output_root: &str, source: &str, layout: TopicLayout) -> Self {
        let root = output_root.trim_end_matches('/');
        Self {
            update: format!("{root}/{SENSOR_CONFIG}/update"),
            global_current: format!("{root}/{SENSOR_CONFIG}/current"),
            host_current: format!("{root}/{source}/{SENSOR_CONFIG}/current"),
            data_namespace: format!("{root}/{source}/sensors"),
            layout,
        }
    }

    /// Output topic for one device's aggregate record.
    pub fn device_topic(&self, device_id: &str, resolution: &Resolution) -> String {
        match self.layout {
            TopicLayout::Flat => format!(
                "{}/devices/{}",
                self.data_namespace,
                topic_level(device_id)
            ),
            TopicLayout::Categorized => format!(
                "{}/{}/{}",
                self.data_namespace,
                resolution.category.route(),
                topic_level(&resolution.display_name)
            ),
        }
    }

    /// Whether `topic` is one of the two inbound config topics.
    pub fn is_config_topic(&self, topic: &str) -> bool {
        topic == self.update || topic == self.global_current
    }
}

/// Device ids and display names may contain characters that are not valid
/// inside one level.
fn topic_level(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '+' | '#' | '\0' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn resolution(name: &str, category: Category) -> Resolution {
        Resolution {
            display_name: name.into(),
            machine_name: None,
            category,
            protocol: None,
        }
    }

    #[test]
    fn config_topics() {
        let topics = Topics::new("KTBMES", "pi4", TopicLayout::Flat);
        assert_eq!(topics.update, "KTBMES/sensors/config/local_sensors/update");
        assert_eq!(topics.global_current, "KTBMES/sensors/config/local_sensors/current");
        assert_eq!(topics.host_current, "KTBMES/pi4/sensors/config/local_sensors/current");
        assert!(topics.is_config_topic("KTBMES/sensors/config/local_sensors/update"));
        assert!(!topics.is_config_topic(&topics.host_current));
    }

    #[test]
    fn flat_layout() {
        let topics = Topics::new("KTBMES/", "pi4", TopicLayout::Flat);
        let r = resolution("Back Porch", Category::Known);
        assert_eq!(topics.device_topic("42", &r), "KTBMES/pi4/sensors/devices/42");
        let topic = topics.device_topic("a/b+#", &r);
        assert_eq!(topic, "KTBMES/pi4/sensors/devices/a_b__");
        assert!(republish_mqtt::validate_topic_name(&topic).is_ok());
    }

    #[test]
    fn categorized_layout() {
        let topics = Topics::new("KTBMES", "pi4", TopicLayout::Categorized);
        assert_eq!(
            topics.device_topic("42", &resolution("Back Porch", Category::Known)),
            "KTBMES/pi4/sensors/house_weather_sensors/Back Porch"
        );
        assert_eq!(
            topics.device_topic("7", &resolution("unknown_7", Category::Other("other_weather".into()))),
            "KTBMES/pi4/sensors/other_weather_sensors/unknown_7"
        );
        assert_eq!(
            topics.device_topic("8", &resolution("a/b#", Category::Uncategorized)),
            "KTBMES/pi4/sensors/unknown_other_sensors/a_b_"
        );
    }
}
