/*
Aliases for data types for readability and to allow changing representation in future
*/

pub type Timestamp = u64; // Milliseconds since the Unix epoch
pub type PortNumber = u16; // Conforms to TCP/IP port numbering
pub type MessageCount = u32; // The number of messages to fetch for one topic in one request
pub type ErrorCode = u16; // Numeric value returned with error responses to identify the specific error

pub type MessageId = String; // Opaque, ordered by the message store that issued it
pub type TopicKey = String; // Logical name used in configuration, resolved by the remote side
pub type TopicName = String; // Physical topic name inside a message store
pub type SubscriberName = String; // Identifies the owner of a persisted offset
