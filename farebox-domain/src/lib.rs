pub mod booking;
pub mod order;
pub mod payment;
pub mod schedule;
pub mod seat;

pub use booking::{Booking, BookingStatus};
pub use order::{Order, OrderStatus, Ticket};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use schedule::Schedule;
pub use seat::{Seat, SeatClass, SeatStatus};
